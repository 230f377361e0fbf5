//! EC2 instance metadata client.
//!
//! Reads the instance identity document (instance ID, region) over IMDSv2. If the token
//! request fails (IMDSv1-only instances, or hop limits), the document is requested without
//! a token. The identity only feeds the tag lookup; the remapper never sees it.

use log::{debug, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const TOKEN_PATH: &str = "/latest/api/token";
const IDENTITY_PATH: &str = "/latest/dynamic/instance-identity/document";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_TTL_SECS: &str = "21600";

/// Fields of the instance identity document the agent uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdentity {
    pub instance_id: String,
    pub region: String,
    pub account_id: Option<String>,
    pub availability_zone: Option<String>,
}

/// Error talking to the metadata service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The HTTP client couldn't be built.
    Client(String),
    /// The request didn't complete (no route, timeout).
    Request(String),
    /// The service answered with a non-success status.
    Status(u16),
    /// The identity document didn't parse.
    Parse(String),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(msg) => write!(f, "Failed to create HTTP client: {}", msg),
            Self::Request(msg) => write!(f, "Metadata request failed: {}", msg),
            Self::Status(code) => write!(f, "Metadata service returned HTTP {}", code),
            Self::Parse(msg) => write!(f, "Invalid identity document: {}", msg),
        }
    }
}

impl std::error::Error for MetadataError {}

pub struct MetadataClient {
    endpoint: String,
    client: Client,
}

impl MetadataClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, MetadataError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetadataError::Client(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Requests an IMDSv2 session token. `None` means "fall back to IMDSv1".
    fn token(&self) -> Option<String> {
        let response = match self
            .client
            .put(self.url(TOKEN_PATH))
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                debug!("IMDSv2 token request failed, trying without token: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!("IMDSv2 token request returned {}, trying without token", response.status());
            return None;
        }
        response.text().ok().map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
    }

    pub fn identity(&self) -> Result<InstanceIdentity, MetadataError> {
        let mut request = self.client.get(self.url(IDENTITY_PATH));
        match self.token() {
            Some(token) => request = request.header(TOKEN_HEADER, token),
            None => warn!("Reading instance metadata without an IMDSv2 token"),
        }

        let response = request.send().map_err(|e| MetadataError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status(status.as_u16()));
        }

        let body = response.text().map_err(|e| MetadataError::Request(e.to_string()))?;
        parse_identity(&body)
    }
}

pub fn parse_identity(document: &str) -> Result<InstanceIdentity, MetadataError> {
    serde_json::from_str(document).map_err(|e| MetadataError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    const DOCUMENT: &str = r#"{
        "accountId": "123456789012",
        "architecture": "x86_64",
        "availabilityZone": "eu-west-1b",
        "imageId": "ami-0123456789abcdef0",
        "instanceId": "i-0abc1234def567890",
        "instanceType": "m6i.large",
        "privateIp": "10.0.1.23",
        "region": "eu-west-1",
        "version": "2017-09-30"
    }"#;

    /// Minimal metadata service. Serves `connections` requests, one per connection.
    fn fake_imds(connections: usize, supports_v2: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            for stream in listener.incoming().take(connections) {
                let mut stream = stream.unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();

                let mut has_token = false;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                    if line.to_ascii_lowercase().starts_with("x-aws-ec2-metadata-token:") {
                        has_token = true;
                    }
                }

                let (status, body) = if request_line.starts_with("PUT") {
                    if supports_v2 { ("200 OK", "token-abc") } else { ("403 Forbidden", "") }
                } else if supports_v2 && !has_token {
                    ("401 Unauthorized", "")
                } else {
                    ("200 OK", DOCUMENT)
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).unwrap();
            }
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_parse_identity_document() {
        let identity = parse_identity(DOCUMENT).unwrap();
        assert_eq!(identity.instance_id, "i-0abc1234def567890");
        assert_eq!(identity.region, "eu-west-1");
        assert_eq!(identity.account_id.as_deref(), Some("123456789012"));
        assert_eq!(identity.availability_zone.as_deref(), Some("eu-west-1b"));
    }

    #[test]
    fn test_parse_identity_rejects_missing_region() {
        let err = parse_identity(r#"{ "instanceId": "i-1" }"#).unwrap_err();
        assert!(matches!(err, MetadataError::Parse(_)));
    }

    #[test]
    fn test_endpoint_trailing_slash_is_trimmed() {
        let client = MetadataClient::new("http://169.254.169.254/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url(IDENTITY_PATH),
            "http://169.254.169.254/latest/dynamic/instance-identity/document"
        );
    }

    #[test]
    fn test_identity_with_imdsv2_token() {
        let endpoint = fake_imds(2, true);
        let client = MetadataClient::new(&endpoint, Duration::from_secs(5)).unwrap();
        assert_eq!(client.identity().unwrap().region, "eu-west-1");
    }

    #[test]
    fn test_identity_falls_back_to_imdsv1() {
        let endpoint = fake_imds(2, false);
        let client = MetadataClient::new(&endpoint, Duration::from_secs(5)).unwrap();
        assert_eq!(client.identity().unwrap().instance_id, "i-0abc1234def567890");
    }

    #[test]
    fn test_unreachable_service_is_a_request_error() {
        // Bind and drop to get a port nothing listens on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let client = MetadataClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_millis(500)).unwrap();
        assert!(matches!(client.identity(), Err(MetadataError::Request(_))));
    }
}
