use crate::config::{DriverMode, SelectorConfig, SiteConfig};
use crate::model::{AddressQuery, RawTextBlock, ScrapeOutcome};
use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{ElementRef, Html, Node, Selector};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Source of raw text blocks for an address.
///
/// Implementations never raise: every navigation problem becomes a
/// [`ScrapeOutcome`] variant.
pub trait SessionDriver {
    fn scrape(&mut self, query: &AddressQuery) -> ScrapeOutcome;

    /// Releases the underlying session. Called exactly once per run.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<D: SessionDriver + ?Sized> SessionDriver for Box<D> {
    fn scrape(&mut self, query: &AddressQuery) -> ScrapeOutcome {
        (**self).scrape(query)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

pub fn open_session(site: &SiteConfig) -> Result<Box<dyn SessionDriver>> {
    match site.mode {
        DriverMode::Http => Ok(Box::new(HttpSession::new(site)?)),
        DriverMode::File => {
            let pages_dir = site
                .pages_dir
                .clone()
                .context("site.pages_dir missing for file mode")?;
            Ok(Box::new(FileSession::new(pages_dir, site.selectors.clone())))
        }
    }
}

/// A form ready to be sent: resolved action, method and field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    pub action: String,
    pub method: String,
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    fn set_field(&mut self, name: &str, value: &str) {
        match self.fields.iter().position(|(k, _)| k == name) {
            Some(index) => self.fields[index].1 = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressChoice {
    Link(String),
    Form(FormSubmission),
}

pub struct HttpSession {
    client: Client,
    site: SiteConfig,
}

impl HttpSession {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(user_agent) = &site.user_agent {
            headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(site.timeout_secs))
            .cookie_store(true)
            .default_headers(headers)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            site: site.clone(),
        })
    }

    fn lookup(&self, query: &AddressQuery) -> Result<ScrapeOutcome> {
        let selectors = &self.site.selectors;
        let (mut page_url, mut page) = self.get(&self.site.base_url, None)?;

        if let Some(consent) = find_consent_submission(&page, &page_url, selectors)? {
            let timeout = Duration::from_secs(self.site.consent_timeout_secs);
            match self.submit(&consent, Some(timeout)) {
                Ok((url, body)) => {
                    debug!(address = %query.name, "consent dialog dismissed");
                    page_url = url;
                    page = body;
                }
                Err(err) => {
                    debug!(address = %query.name, error = %err, "consent dismissal failed; continuing");
                }
            }
        } else {
            debug!(address = %query.name, "no consent dialog found");
        }

        let search = build_postcode_submission(&page, &page_url, selectors, &query.postcode)?;
        let (list_url, list_page) = self
            .submit(&search, None)
            .with_context(|| format!("postcode search for {} failed", query.postcode))?;

        let Some(choice) = choose_address(&list_page, &list_url, selectors, &query.house)? else {
            return Ok(ScrapeOutcome::AddressNotFound);
        };

        let (_, result_page) = match choice {
            AddressChoice::Link(href) => self.get(&href, None)?,
            AddressChoice::Form(form) => self.submit(&form, None)?,
        };

        let blocks = extract_blocks(&result_page, &selectors.date_marker)?;
        Ok(ScrapeOutcome::Blocks(blocks))
    }

    fn get(&self, url: &str, timeout: Option<Duration>) -> Result<(String, String)> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        read_page(request.send().with_context(|| format!("request to {url} failed"))?)
    }

    fn submit(&self, form: &FormSubmission, timeout: Option<Duration>) -> Result<(String, String)> {
        let mut request = match form.method.as_str() {
            "GET" => self.client.get(&form.action).query(&form.fields),
            "POST" => self.client.post(&form.action).form(&form.fields),
            other => bail!("unsupported form method {other}"),
        };
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .with_context(|| format!("request to {} failed", form.action))?;
        read_page(response)
    }
}

impl SessionDriver for HttpSession {
    fn scrape(&mut self, query: &AddressQuery) -> ScrapeOutcome {
        match self.lookup(query) {
            Ok(outcome) => outcome,
            Err(err) => ScrapeOutcome::failed(format!("{err:#}")),
        }
    }

    fn close(&mut self) -> Result<()> {
        info!(site = %self.site.base_url, "http session closed");
        Ok(())
    }
}

fn read_page(response: reqwest::blocking::Response) -> Result<(String, String)> {
    let status = response.status();
    let url = response.url().to_string();
    if !status.is_success() {
        bail!("request to {url} failed with status {status}");
    }
    let body = response
        .text()
        .with_context(|| format!("failed to read body of {url}"))?;
    Ok((url, body))
}

/// Reads saved result pages named `<address name>.html` from a directory.
pub struct FileSession {
    pages_dir: PathBuf,
    selectors: SelectorConfig,
}

impl FileSession {
    pub fn new(pages_dir: PathBuf, selectors: SelectorConfig) -> Self {
        Self {
            pages_dir,
            selectors,
        }
    }
}

impl SessionDriver for FileSession {
    fn scrape(&mut self, query: &AddressQuery) -> ScrapeOutcome {
        let path = self.pages_dir.join(format!("{}.html", query.name));
        let page = match std::fs::read_to_string(&path) {
            Ok(page) => page,
            Err(err) => {
                return ScrapeOutcome::failed(format!(
                    "failed to read saved page {}: {err}",
                    path.display()
                ));
            }
        };

        info!(address = %query.name, file = %path.display(), bytes = page.len(), "loaded saved page");
        match extract_blocks(&page, &self.selectors.date_marker) {
            Ok(blocks) => ScrapeOutcome::Blocks(blocks),
            Err(err) => ScrapeOutcome::failed(format!("{err:#}")),
        }
    }
}

/// One block per date marker: the text of the marker's parent element.
pub fn extract_blocks(html: &str, date_marker: &str) -> Result<Vec<RawTextBlock>> {
    let document = Html::parse_document(html);
    let selector = parse_selector(date_marker)?;

    let blocks = document
        .select(&selector)
        .map(|marker| {
            let container = marker
                .parent()
                .and_then(ElementRef::wrap)
                .unwrap_or(marker);
            RawTextBlock::new(element_lines(container).join("\n"))
        })
        .collect::<Vec<_>>();

    debug!(markers = blocks.len(), "extracted date blocks");
    Ok(blocks)
}

/// Picks the first address control whose text contains `house`, ignoring case.
pub fn choose_address(
    html: &str,
    page_url: &str,
    selectors: &SelectorConfig,
    house: &str,
) -> Result<Option<AddressChoice>> {
    let document = Html::parse_document(html);
    let selector = parse_selector(&selectors.address_button)?;
    let target = house.trim().to_lowercase();

    let Some(control) = document.select(&selector).find(|control| {
        element_lines(*control)
            .join(" ")
            .to_lowercase()
            .contains(&target)
    }) else {
        return Ok(None);
    };

    if let Some(href) = control.value().attr("href") {
        return Ok(Some(AddressChoice::Link(absolutize_url(page_url, href))));
    }

    let form = enclosing_form(control)
        .ok_or_else(|| anyhow!("address control has neither a link nor an enclosing form"))?;
    let mut submission = form_submission(form, page_url);
    if let Some(name) = control.value().attr("name") {
        submission.set_field(name, control.value().attr("value").unwrap_or_default());
    }
    Ok(Some(AddressChoice::Form(submission)))
}

/// Builds the search request from the form holding the postcode input.
pub fn build_postcode_submission(
    html: &str,
    page_url: &str,
    selectors: &SelectorConfig,
    postcode: &str,
) -> Result<FormSubmission> {
    let document = Html::parse_document(html);
    let input_selector = parse_selector(&selectors.postcode_input)?;
    let input = document
        .select(&input_selector)
        .next()
        .context("postcode input not found")?;
    let form = enclosing_form(input).context("postcode input is not inside a form")?;

    let mut submission = form_submission(form, page_url);
    let field = input.value().attr("name").unwrap_or("postcode");
    submission.set_field(field, postcode.trim());

    let submit_selector = parse_selector(&selectors.submit)?;
    if let Some(button) = document.select(&submit_selector).next()
        && let Some(name) = button.value().attr("name")
    {
        submission.set_field(name, button.value().attr("value").unwrap_or_default());
    }

    Ok(submission)
}

/// Finds an "accept" button inside a form. `None` means there is nothing to dismiss.
pub fn find_consent_submission(
    html: &str,
    page_url: &str,
    selectors: &SelectorConfig,
) -> Result<Option<FormSubmission>> {
    let document = Html::parse_document(html);
    let selector = parse_selector(&selectors.consent_button)?;

    let Some(button) = document.select(&selector).find(|button| {
        element_lines(*button)
            .join(" ")
            .to_lowercase()
            .contains("accept")
    }) else {
        return Ok(None);
    };

    let Some(form) = enclosing_form(button) else {
        return Ok(None);
    };
    let mut submission = form_submission(form, page_url);
    if let Some(name) = button.value().attr("name") {
        submission.set_field(name, button.value().attr("value").unwrap_or_default());
    }
    Ok(Some(submission))
}

fn form_submission(form: ElementRef<'_>, page_url: &str) -> FormSubmission {
    let action = form
        .value()
        .attr("action")
        .filter(|action| !action.trim().is_empty())
        .map(|action| absolutize_url(page_url, action))
        .unwrap_or_else(|| page_url.to_string());
    let method = form
        .value()
        .attr("method")
        .unwrap_or("GET")
        .to_ascii_uppercase();

    let mut fields = Vec::new();
    if let Ok(inputs) = Selector::parse("input[name]") {
        for input in form.select(&inputs) {
            let kind = input.value().attr("type").unwrap_or("text");
            if matches!(
                kind.to_ascii_lowercase().as_str(),
                "submit" | "button" | "image" | "reset"
            ) {
                continue;
            }
            if let Some(name) = input.value().attr("name") {
                let value = input.value().attr("value").unwrap_or_default();
                fields.push((name.to_string(), value.to_string()));
            }
        }
    }

    FormSubmission {
        action,
        method,
        fields,
    }
}

fn enclosing_form(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "form")
}

/// Elements that start a new line in rendered text. Everything else is inline.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "th",
    "thead", "tr", "ul",
];

/// Rendered text of an element, one entry per visual line.
///
/// Inline markup (`<strong>`, `<sup>`, `<span>`) stays on the surrounding line;
/// block elements and `<br>` break it. Whitespace runs collapse to one space.
fn element_lines(element: ElementRef<'_>) -> Vec<String> {
    let mut lines = vec![String::new()];
    push_rendered_text(element, &mut lines);
    lines
        .iter()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

fn push_rendered_text(element: ElementRef<'_>, lines: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                if let Some(line) = lines.last_mut() {
                    line.push_str(text);
                }
            }
            Node::Element(child_element) => {
                let name = child_element.name();
                if name == "br" {
                    lines.push(String::new());
                    continue;
                }
                if matches!(name, "script" | "style" | "template" | "noscript") {
                    continue;
                }
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    lines.push(String::new());
                }
                push_rendered_text(child_ref, lines);
                if block {
                    lines.push(String::new());
                }
            }
            _ => {}
        }
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|err| anyhow!("invalid selector {selector}: {err:?}"))
}

fn absolutize_url(base_url: &str, value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }

    if let Ok(base) = Url::parse(base_url)
        && let Ok(joined) = base.join(value)
    {
        return joined.to_string();
    }

    value.to_string()
}
