//! Host identity resolution.
//!
//! A run needs a machine-unique identifier and a project identifier. They are
//! resolved once, before anything else happens, either from an explicit
//! override or from the GCE metadata server.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationErrors};

pub static DEFAULT_METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1";
static INSTANCE_ID_PATH: &str = "instance/id";
static PROJECT_ID_PATH: &str = "project/project-id";
const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct HostContext {
    machine_id: String,
    project_id: String,
}

impl HostContext {
    /// Fails with a precondition error when either identifier is blank
    pub fn new<A: AsRef<str>, B: AsRef<str>>(machine_id: A, project_id: B) -> Result<Self> {
        let machine_id = machine_id.as_ref().trim();
        let project_id = project_id.as_ref().trim();
        if machine_id.is_empty() {
            return Err(Error::Precondition("machine id is empty".into()));
        }
        if project_id.is_empty() {
            return Err(Error::Precondition("project id is empty".into()));
        }
        Ok(Self {
            machine_id: machine_id.to_string(),
            project_id: project_id.to_string(),
        })
    }
}

pub trait HostContextSource {
    fn host_context(&self) -> Result<HostContext>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum HostConfig {
    Static(StaticHost),
    MetadataServer(MetadataServer),
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::MetadataServer(MetadataServer::default())
    }
}

impl Validate for HostConfig {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        match self {
            HostConfig::Static(inner) => inner.validate(),
            HostConfig::MetadataServer(inner) => inner.validate(),
        }
    }
}

impl HostContextSource for HostConfig {
    fn host_context(&self) -> Result<HostContext> {
        match self {
            HostConfig::Static(inner) => inner.host_context(),
            HostConfig::MetadataServer(inner) => inner.host_context(),
        }
    }
}

/// Identity supplied by configuration or command line
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Validate, Builder)]
#[serde(deny_unknown_fields)]
pub struct StaticHost {
    #[validate(length(min = 1))]
    #[builder(into)]
    pub machine_id: String,
    #[validate(length(min = 1))]
    #[builder(into)]
    pub project_id: String,
}

impl HostContextSource for StaticHost {
    fn host_context(&self) -> Result<HostContext> {
        HostContext::new(&self.machine_id, &self.project_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Validate, Builder)]
#[serde(deny_unknown_fields)]
pub struct MetadataServer {
    #[serde(default = "default_base_url")]
    #[builder(default = default_base_url(), into)]
    #[validate(url)]
    pub base_url: String,
    #[serde(default = "default_metadata_timeout", with = "humantime_serde")]
    #[builder(default = DEFAULT_METADATA_TIMEOUT)]
    pub metadata_timeout: Duration,
}

fn default_base_url() -> String {
    DEFAULT_METADATA_BASE_URL.to_string()
}

fn default_metadata_timeout() -> Duration {
    DEFAULT_METADATA_TIMEOUT
}

impl Default for MetadataServer {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MetadataServer {
    fn fetch(&self, client: &reqwest::blocking::Client, path: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        tracing::debug!("Querying metadata server {url}");
        let response = client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| {
                Error::Precondition(format!("metadata server query {url} failed: {e}"))
            })?;
        Ok(response)
    }
}

impl HostContextSource for MetadataServer {
    fn host_context(&self) -> Result<HostContext> {
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .connect_timeout(self.metadata_timeout)
            .timeout(self.metadata_timeout)
            .build()?;
        let machine_id = self.fetch(&client, INSTANCE_ID_PATH)?;
        let project_id = self.fetch(&client, PROJECT_ID_PATH)?;
        HostContext::new(machine_id, project_id)
            .with_msg(format!("Metadata server {} returned no identity", self.base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Serves `responses` in order, one connection each, answering 200 with the given body
    fn serve(responses: Vec<(&'static str, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/computeMetadata/v1", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut has_flavor = false;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line.to_ascii_lowercase().starts_with("metadata-flavor: google") {
                        has_flavor = true;
                    }
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                }
                seen.push(format!("{} flavor={}", request_line.trim(), has_flavor));
                write!(
                    stream,
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .unwrap();
            }
            seen
        });
        (base, handle)
    }

    #[test]
    fn test_host_context_rejects_blank_ids() {
        assert!(HostContext::new("", "proj").unwrap_err().is_precondition());
        assert!(HostContext::new("123", "  ").unwrap_err().is_precondition());
        let ctx = HostContext::new(" 123\n", "proj").unwrap();
        assert_eq!(ctx.machine_id(), "123");
    }

    #[test]
    fn test_static_host_source() {
        let host = StaticHost::builder().machine_id("m-1").project_id("p-1").build();
        let ctx = host.host_context().unwrap();
        assert_eq!(ctx.project_id(), "p-1");
    }

    #[test]
    fn test_metadata_server_source() {
        let (base, handle) = serve(vec![("200 OK", "8812345"), ("200 OK", "my-project")]);
        let source = MetadataServer::builder().base_url(base).build();

        let ctx = source.host_context().unwrap();
        assert_eq!(ctx.machine_id(), "8812345");
        assert_eq!(ctx.project_id(), "my-project");

        let seen = handle.join().unwrap();
        assert_eq!(
            seen,
            vec![
                "GET /computeMetadata/v1/instance/id HTTP/1.1 flavor=true",
                "GET /computeMetadata/v1/project/project-id HTTP/1.1 flavor=true",
            ]
        );
    }

    #[test]
    fn test_metadata_server_empty_identity_is_precondition() {
        let (base, handle) = serve(vec![("200 OK", ""), ("200 OK", "my-project")]);
        let source = MetadataServer::builder().base_url(base).build();

        assert!(source.host_context().unwrap_err().is_precondition());
        handle.join().unwrap();
    }

    #[test]
    fn test_metadata_server_unreachable_is_precondition() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let source = MetadataServer::builder()
            .base_url(format!("http://127.0.0.1:{port}"))
            .metadata_timeout(Duration::from_millis(200))
            .build();

        assert!(source.host_context().unwrap_err().is_precondition());
    }

    #[test]
    fn test_host_config_deserialize() {
        let yaml = "type: static\nmachine_id: abc\nproject_id: proj\n";
        let config: HostConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(
            config,
            HostConfig::Static(StaticHost::builder().machine_id("abc").project_id("proj").build())
        );

        let yaml = "type: metadata_server\nmetadata_timeout: 5s\n";
        let config: HostConfig = serde_yml::from_str(yaml).unwrap();
        match config {
            HostConfig::MetadataServer(m) => {
                assert_eq!(m.metadata_timeout, Duration::from_secs(5));
                assert_eq!(m.base_url, DEFAULT_METADATA_BASE_URL);
            }
            _ => panic!("Expected metadata server"),
        }
    }
}
