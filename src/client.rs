use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::FetchError;
use crate::models::Device;

/// Cumulative counters reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub entered: u64,
    pub exited: u64,
}

/// Trait for reading the current counters of a device.
pub trait DeviceClient: Send + Sync {
    fn fetch(
        &self,
        device: &Device,
    ) -> impl std::future::Future<Output = Result<Counts, FetchError>> + Send;
}

const COUNT_PATH: &str = "/iAPI/apps.cgi?action=read&path=personcount.default";
const ENTERED_PARAM: &str = "inCountTotal";
const EXITED_PARAM: &str = "outCountTotal";

/// Reads the person-count application of a camera over HTTP.
pub struct HttpDeviceClient {
    client: reqwest::Client,
}

impl HttpDeviceClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn url_for(device: &Device) -> String {
        let base = if device.id.starts_with("http://") || device.id.starts_with("https://") {
            device.id.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", device.id)
        };
        format!("{}{}", base, COUNT_PATH)
    }
}

impl DeviceClient for HttpDeviceClient {
    async fn fetch(&self, device: &Device) -> Result<Counts, FetchError> {
        let mut request = self.client.get(Self::url_for(device));
        if let Some(username) = &device.username {
            request = request.basic_auth(username, device.password.as_deref());
        }

        let http_err = |source| FetchError::Http {
            device: device.id.clone(),
            source,
        };

        let response = request.send().await.map_err(http_err)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                device: device.id.clone(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(http_err)?;
        parse_counts(&body).map_err(|reason| FetchError::Parse {
            device: device.id.clone(),
            reason,
        })
    }
}

/// Extract the entered/exited totals from a person-count response.
///
/// Some firmware prefixes the XML with a `Content-Type` line, which is skipped.
/// Both counters must be present.
pub fn parse_counts(body: &str) -> Result<Counts, String> {
    let xml = strip_preamble(body);

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<&'static str> = None;
    let mut entered = None;
    let mut exited = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = None;
                if e.local_name().as_ref() == b"parameter" {
                    let name = e
                        .try_get_attribute("name")
                        .map_err(|e| format!("bad attribute: {}", e))?;
                    current = match name.as_ref().map(|a| a.value.as_ref()) {
                        Some(v) if v == ENTERED_PARAM.as_bytes() => Some(ENTERED_PARAM),
                        Some(v) if v == EXITED_PARAM.as_bytes() => Some(EXITED_PARAM),
                        _ => None,
                    };
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(param) = current {
                    let text = String::from_utf8_lossy(e.as_ref());
                    let value = text
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| format!("{} is not a counter: {:?}", param, text.trim()))?;
                    if param == ENTERED_PARAM {
                        entered = Some(value);
                    } else {
                        exited = Some(value);
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML error at {}: {}", reader.buffer_position(), e)),
            _ => {}
        }
    }

    match (entered, exited) {
        (Some(entered), Some(exited)) => Ok(Counts { entered, exited }),
        (None, _) => Err(format!("missing {}", ENTERED_PARAM)),
        (_, None) => Err(format!("missing {}", EXITED_PARAM)),
    }
}

fn strip_preamble(body: &str) -> &str {
    let trimmed = body.trim_start();
    if trimmed.starts_with("Content-Type:") {
        match trimmed.split_once('\n') {
            Some((_, rest)) => rest.trim(),
            None => "",
        }
    } else {
        trimmed
    }
}
