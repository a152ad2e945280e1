use bollard::{
    models::BuildInfo,
    query_parameters::{BuildImageOptions, PushImageOptions},
    Docker, API_DEFAULT_VERSION,
};
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use http_body_util::{Either, Full};
use ignore::WalkBuilder;
use log::{debug, error, info, warn};
use number_prefix::NumberPrefix;
use serde::Serialize;
use serde_json::{json, Map as JsonMap, Value};
use std::{io, path::Path};
use tar::Builder as TarBuilder;
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};

use crate::{
    errors::{Error, Result},
    manifest::MANIFEST_FILE_NAME,
    models::ProgressEvent,
    services::{BuildEngine, Observer},
};

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Builds images through the Docker Engine API, streaming progress events
/// back to the caller as they arrive.
pub struct DockerApiEngine {
    client: Docker,
    runtime: Runtime,
}

impl DockerApiEngine {
    pub fn connect(docker_host: &str) -> Result<DockerApiEngine> {
        let runtime = RuntimeBuilder::new_current_thread().enable_all().build()?;

        let client = {
            let _guard = runtime.enter();
            connect_client(docker_host)?
        };
        info!("connected to docker at {}", docker_host);

        Ok(DockerApiEngine { client, runtime })
    }
}

fn connect_client(docker_host: &str) -> Result<Docker> {
    let client = match docker_host.split("://").next() {
        #[cfg(unix)]
        Some("unix") => {
            Docker::connect_with_unix(docker_host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        #[cfg(windows)]
        Some("npipe") => {
            Docker::connect_with_named_pipe(docker_host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        Some("tcp") | Some("http") => {
            Docker::connect_with_http(docker_host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        _ => {
            return Err(Error::Engine(format!(
                "unsupported docker host {:?}",
                docker_host
            )))
        }
    };

    client.map_err(|err| Error::Engine(format!("couldn't connect to {}: {}", docker_host, err)))
}

impl BuildEngine for DockerApiEngine {
    fn build_image(&mut self, context: &Path, tag: &str, observer: &mut Observer) -> Result<bool> {
        let archive = archive_context(context)?;

        let options = BuildImageOptions {
            dockerfile: MANIFEST_FILE_NAME.to_string(),
            t: Some(tag.to_string()),
            pull: Some("true".to_string()),
            rm: true,
            ..Default::default()
        };

        let client = &self.client;
        let success = self.runtime.block_on(async move {
            let stream = client.build_image(
                options,
                None,
                Some(Either::Left(Full::new(Bytes::from(archive)))),
            );
            forward_events(stream.map(|item| item.map(build_event)), observer).await
        });

        Ok(success)
    }

    fn push_image(&mut self, tag: &str, observer: &mut Observer) -> Result<bool> {
        let (repository, tag) = parse_image_ref(tag);
        info!("pushing {}:{}", repository, tag.unwrap_or("latest"));

        let options = PushImageOptions {
            tag: Some(tag.unwrap_or("latest").to_string()),
            platform: None,
        };

        let client = &self.client;
        let success = self.runtime.block_on(async move {
            let stream = client.push_image(repository, Some(options), None);
            forward_events(stream.map(|item| item.map(serialized_event)), observer).await
        });

        Ok(success)
    }
}

/// Converts a build stream entry into the JSON object Docker sent for it.
fn build_event(info: BuildInfo) -> ProgressEvent {
    let mut event = JsonMap::new();

    let fields = vec![
        ("stream", info.stream),
        ("status", info.status),
        ("progress", info.progress),
        ("error", info.error),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            event.insert(key.into(), Value::String(value));
        }
    }

    if let Some(message) = info.error_detail.and_then(|detail| detail.message) {
        event.insert("errorDetail".into(), json!({ "message": message }));
    }

    ProgressEvent(Value::Object(event))
}

fn serialized_event<T: Serialize>(info: T) -> ProgressEvent {
    match serde_json::to_value(&info) {
        Ok(value) => ProgressEvent(value),
        Err(err) => {
            warn!("couldn't serialize engine event: {}", err);
            ProgressEvent(Value::Null)
        }
    }
}

/// Forwards every entry of an engine stream to `observer`, in order.
/// Returns `false` if any entry carried an error or the stream broke off.
async fn forward_events<S>(mut stream: S, observer: &mut Observer<'_>) -> bool
where
    S: Stream<Item = std::result::Result<ProgressEvent, bollard::errors::Error>> + Unpin,
{
    let mut success = true;

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if let Some(message) = event.error() {
                    error!("engine reported an error: {}", message);
                    success = false;
                } else {
                    debug!("{}", event.0);
                }

                observer(&event);
            }
            Err(err) => {
                error!("engine stream failed: {}", err);
                observer(&ProgressEvent(json!({ "error": err.to_string() })));
                return false;
            }
        }
    }

    success
}

/// Archives the build context into an in-memory tarball, skipping anything
/// matched by a `.dockerignore` file.
fn archive_context(context: &Path) -> Result<Vec<u8>> {
    let mut tar = TarBuilder::new(Vec::new());
    let walk = WalkBuilder::new(context)
        .add_custom_ignore_filename(".dockerignore")
        .parents(false)
        .ignore(false)
        .git_global(false)
        .git_ignore(false)
        .git_exclude(false)
        .hidden(false)
        .build();

    let mut context_size = 0;
    for result in walk {
        let entry = result.map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let relative_path = match entry.path().strip_prefix(context) {
            Ok(path) if !path.as_os_str().is_empty() => path,
            _ => continue,
        };

        let metadata = entry
            .metadata()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        if metadata.is_dir() {
            tar.append_dir(relative_path, entry.path())?;
        } else {
            tar.append_path_with_name(entry.path(), relative_path)?;
            context_size += metadata.len();
        }
    }

    match NumberPrefix::binary(context_size as f32) {
        NumberPrefix::Standalone(bytes) => info!("archived build context ({} bytes)", bytes),
        NumberPrefix::Prefixed(prefix, n) => {
            info!("archived build context ({:.1} {}B)", n, prefix)
        }
    };

    Ok(tar.into_inner()?)
}

/// Splits an image reference into its repository and tag. A colon that is
/// followed by a path segment belongs to a registry port, not a tag, and an
/// `@digest` suffix is dropped.
pub fn parse_image_ref(image_ref: &str) -> (&str, Option<&str>) {
    let image_ref = match image_ref.split_once('@') {
        Some((name, _digest)) => name,
        None => image_ref,
    };

    if let Some((repository, tag)) = image_ref.rsplit_once(':') {
        if !tag.contains('/') {
            return (repository, Some(tag));
        }
    }

    (image_ref, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::{fs, io::Read};
    use tempfile::TempDir;

    fn build_info(stream: Option<&str>, error: Option<&str>) -> BuildInfo {
        BuildInfo {
            stream: stream.map(String::from),
            error: error.map(String::from),
            ..Default::default()
        }
    }

    fn run_forward(
        entries: Vec<std::result::Result<BuildInfo, bollard::errors::Error>>,
    ) -> (bool, Vec<ProgressEvent>) {
        let runtime = RuntimeBuilder::new_current_thread().build().unwrap();
        let mut events = Vec::new();
        let entries = stream::iter(entries).map(|item| item.map(build_event));
        let success = runtime.block_on(forward_events(entries, &mut |event| {
            events.push(event.clone())
        }));
        (success, events)
    }

    #[test]
    fn parses_image_refs() {
        assert_eq!(parse_image_ref("myapp:latest"), ("myapp", Some("latest")));
        assert_eq!(
            parse_image_ref("myregistry.io/myapp"),
            ("myregistry.io/myapp", None)
        );
        assert_eq!(
            parse_image_ref("localhost:5000/myapp:v1"),
            ("localhost:5000/myapp", Some("v1"))
        );
        assert_eq!(
            parse_image_ref("localhost:5000/myapp"),
            ("localhost:5000/myapp", None)
        );
    }

    #[test]
    fn parses_digest_image_refs() {
        assert_eq!(parse_image_ref("myapp@sha256:abc123"), ("myapp", None));
        assert_eq!(
            parse_image_ref("localhost:5000/myapp:v1@sha256:abc123"),
            ("localhost:5000/myapp", Some("v1"))
        );
    }

    #[test]
    fn forwards_events_in_order() {
        let (success, events) = run_forward(vec![
            Ok(build_info(Some("Step 1/2"), None)),
            Ok(build_info(Some("Step 2/2"), None)),
        ]);

        assert!(success);
        let lines = events.iter().filter_map(|e| e.stream()).collect::<Vec<_>>();
        assert_eq!(lines, vec!["Step 1/2", "Step 2/2"]);
    }

    #[test]
    fn error_entries_fail_the_stream() {
        let (success, events) = run_forward(vec![
            Ok(build_info(Some("Step 1/2"), None)),
            Ok(build_info(None, Some("manifest unknown"))),
        ]);

        assert!(!success);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].error(), Some("manifest unknown"));
    }

    #[test]
    fn error_details_fail_the_stream() {
        let info = BuildInfo {
            error_detail: Some(bollard::models::ErrorDetail {
                message: Some("failed to solve".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let (success, events) = run_forward(vec![Ok(info)]);

        assert!(!success);
        assert_eq!(events[0].error(), Some("failed to solve"));
    }

    #[test]
    fn transport_errors_stop_the_stream() {
        let (success, events) = run_forward(vec![
            Ok(build_info(Some("Step 1/2"), None)),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 500,
                message: "daemon went away".into(),
            }),
            Ok(build_info(Some("Step 2/2"), None)),
        ]);

        assert!(!success);
        assert_eq!(events.len(), 2);
        assert!(events[1].error().unwrap().contains("daemon went away"));
    }

    #[test]
    fn push_entries_keep_their_json() {
        let info = bollard::models::PushImageInfo {
            status: Some("Pushed".into()),
            ..Default::default()
        };

        let event = serialized_event(info);
        assert_eq!(event.status(), Some("Pushed"));
        assert_eq!(event.error(), None);
    }

    #[test]
    fn archive_respects_dockerignore() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch").unwrap();
        fs::write(dir.path().join(".dockerignore"), "secret.txt\n").unwrap();
        fs::write(dir.path().join("secret.txt"), "hunter2").unwrap();
        fs::create_dir(dir.path().join("conf")).unwrap();
        fs::write(dir.path().join("conf").join("app.toml"), "port = 80").unwrap();

        let archive = archive_context(dir.path()).unwrap();
        let mut archive = tar::Archive::new(archive.as_slice());
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let name = name.trim_end_matches('/').to_string();
            if name == "Dockerfile" {
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                assert_eq!(content, "FROM scratch");
            }
            names.push(name);
        }
        names.sort();

        assert_eq!(
            names,
            vec![".dockerignore", "Dockerfile", "conf", "conf/app.toml"]
        );
    }

    #[test]
    fn rejects_unknown_hosts() {
        assert!(matches!(
            DockerApiEngine::connect("ssh://builder@10.0.0.2"),
            Err(Error::Engine(_))
        ));
    }
}
