use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::{decode::Encoding, Term};

pub const DEFAULT_SCHEDULE_URL: &str = "https://selfservice.mypurdue.purdue.edu/prod/bwckschd.p_disp_dyn_sched";

/// Banner's section search, relative to the schedule page
const SEARCH_PATH: &str = "bwckschd.p_get_crse_unsec";

const USER_AGENT: &str = concat!("sched_scraper/", env!("CARGO_PKG_VERSION"));

/// Body Purdue serves (with a 200) when it throttles a client
const RATE_LIMIT_NOTICE: &str = "We are sorry, but the site has received too many requests";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),
    #[error("invalid schedule url {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {url} failed")]
    Request {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}")]
    Status { url: Url, status: StatusCode },
    #[error("{0} is rate limiting requests, try again later")]
    RateLimited(Url),
}

/// One term and subject to search for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleQuery {
    pub term: Term,
    pub subject: String,
}

impl ScheduleQuery {
    /// Banner wants every multi-select field present once as `dummy` before
    /// the real values, in this order
    pub fn form(&self) -> Vec<(&'static str, String)> {
        let dummies = [
            "sel_subj", "sel_day", "sel_schd", "sel_insm", "sel_camp", "sel_levl", "sel_sess", "sel_instr",
            "sel_ptrm", "sel_attr",
        ];
        let values = [
            ("sel_subj", self.subject.to_ascii_uppercase()),
            ("sel_crse", String::new()),
            ("sel_title", String::new()),
            ("sel_schd", "%".to_string()),
            ("sel_insm", "%".to_string()),
            ("sel_from_cred", String::new()),
            ("sel_to_cred", String::new()),
            ("sel_camp", "%".to_string()),
            ("sel_levl", "%".to_string()),
            ("sel_ptrm", "%".to_string()),
            ("sel_instr", "%".to_string()),
            ("sel_attr", "%".to_string()),
            ("begin_hh", "0".to_string()),
            ("begin_mi", "0".to_string()),
            ("begin_ap", "a".to_string()),
            ("end_hh", "0".to_string()),
            ("end_mi", "0".to_string()),
            ("end_ap", "a".to_string()),
        ];

        std::iter::once(("term_in", self.term.to_string()))
            .chain(dummies.into_iter().map(|field| (field, "dummy".to_string())))
            .chain(values)
            .collect()
    }
}

/// A downloaded schedule page, not yet decoded
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: Url,
    pub body: Vec<u8>,
    /// Charset named by the server, if it's one we can decode
    pub encoding: Option<Encoding>,
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Fetcher { client }
    }

    /// Downloads the schedule page at `base`. With a query the section
    /// search next to it is posted instead, the way the page's own form does.
    pub async fn fetch(&self, base: &str, query: Option<&ScheduleQuery>) -> Result<FetchedPage, FetchError> {
        let base = Url::parse(base).map_err(|source| FetchError::InvalidUrl {
            url: base.to_string(),
            source,
        })?;

        let (url, request) = match query {
            Some(query) => {
                let url = base.join(SEARCH_PATH).map_err(|source| FetchError::InvalidUrl {
                    url: base.to_string(),
                    source,
                })?;
                info!(%url, term = %query.term.human_display(), subject = %query.subject, "searching sections");
                let request = self.client.post(url.clone()).form(&query.form());
                (url, request)
            }
            None => {
                info!(url = %base, "fetching schedule page");
                (base.clone(), self.client.get(base))
            }
        };

        let response = request.send().await.map_err(|source| FetchError::Request {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        let encoding = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(Encoding::from_content_type);

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?
            .to_vec();
        debug!(bytes = body.len(), ?encoding, "downloaded schedule page");

        if String::from_utf8_lossy(&body).contains(RATE_LIMIT_NOTICE) {
            return Err(FetchError::RateLimited(url));
        }

        Ok(FetchedPage { url, body, encoding })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::Season;
    use pretty_assertions::assert_eq;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serves `response` verbatim to the first connection and returns the
    /// schedule url pointing at it
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/prod/bwckschd.p_disp_dyn_sched")
    }

    fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn fetcher() -> Fetcher {
        Fetcher::with_client(Client::builder().no_proxy().build().unwrap())
    }

    #[test]
    fn form_puts_dummies_first() {
        let query = ScheduleQuery {
            term: Term::new(Season::Fall, 2024),
            subject: "cs".to_string(),
        };
        let form = query.form();
        assert_eq!(form[0], ("term_in", "202510".to_string()));
        assert_eq!(form[1], ("sel_subj", "dummy".to_string()));
        let subjects: Vec<_> = form.iter().filter(|(k, _)| *k == "sel_subj").collect();
        assert_eq!(
            subjects,
            vec![&("sel_subj", "dummy".to_string()), &("sel_subj", "CS".to_string())]
        );
        assert_eq!(form.last(), Some(&("end_ap", "a".to_string())));
    }

    #[tokio::test]
    async fn returns_body_and_charset() {
        let url = serve_once(http_response(
            "200 OK",
            "text/html; charset=ISO-8859-1",
            "<table></table>",
        ))
        .await;
        let page = fetcher().fetch(&url, None).await.unwrap();
        assert_eq!(page.body, b"<table></table>");
        assert_eq!(page.encoding, Some(Encoding::Latin1));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let url = serve_once(http_response("503 Service Unavailable", "text/plain", "down")).await;
        let err = fetcher().fetch(&url, None).await.unwrap_err();
        let FetchError::Status { status, .. } = err else {
            panic!("expected a status error, got {err:?}");
        };
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn rate_limit_page_is_an_error() {
        let body = format!("<html><body>{RATE_LIMIT_NOTICE}. Please try again later.</body></html>");
        let url = serve_once(http_response("200 OK", "text/html", &body)).await;
        let err = fetcher().fetch(&url, None).await.unwrap_err();
        assert!(matches!(err, FetchError::RateLimited(_)));
    }

    #[tokio::test]
    async fn bad_url_is_rejected_before_sending() {
        let err = fetcher().fetch("not a url", None).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
