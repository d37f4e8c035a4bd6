use crate::admission::Admission;
use crate::compilation::FrontendInvocation;
use crate::compilation::compile;
use crate::config::ServerConfiguration;
use crate::error::Result;
use crate::registry::FrontendRegistry;
use flock_protocol::CompileRequest;
use flock_protocol::CompileResponse;
use flock_protocol::FailureReason;
use flock_protocol::ProtocolError;
use flock_protocol::read_frame;
use flock_protocol::write_frame;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use strum_macros::Display;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Lifecycle of one request, logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RequestState {
    Received,
    VersionMatched,
    Admitted,
    Compiling,
    Completed,
    Failed,
}

/// Shared by every connection task. Everything but the admission gauge is
/// read-only after startup.
#[derive(Debug)]
pub struct FlockServer {
    registry: FrontendRegistry,
    sdks: BTreeMap<String, PathBuf>,
    admission: Admission,
    compilation_timeout: Duration,
    request_read_timeout: Duration,
    next_request_id: AtomicU64,
}

/// How long a peer has to deliver its whole request frame.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(60);

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

fn validate(request: &CompileRequest) -> std::result::Result<(), String> {
    request.inputs.validate().map_err(|err| err.to_string())?;
    let files = request.inputs.source_files.len();
    if request.sources.len() != files {
        return Err(format!(
            "{} source file contents for {files} source files",
            request.sources.len()
        ));
    }
    if let Some(path) = request
        .inputs
        .source_files
        .iter()
        .find(|path| !is_plain_relative(path))
    {
        return Err(format!(
            "source file path {} must be relative and stay inside the base directory",
            path.display()
        ));
    }
    Ok(())
}

impl FlockServer {
    pub fn new(config: &ServerConfiguration, registry: FrontendRegistry) -> Self {
        Self {
            registry,
            sdks: config.sdks.clone(),
            admission: Admission::new(config.number_of_parallel_compilations),
            compilation_timeout: config.compilation_timeout(),
            request_read_timeout: REQUEST_READ_TIMEOUT,
            next_request_id: AtomicU64::new(1),
        }
    }

    #[cfg(test)]
    fn with_request_read_timeout(mut self, timeout: Duration) -> Self {
        self.request_read_timeout = timeout;
        self
    }

    pub const fn registry(&self) -> &FrontendRegistry {
        &self.registry
    }

    pub async fn handle_request(&self, request: CompileRequest) -> CompileResponse {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        info!(
            id,
            state = %RequestState::Received,
            files = request.inputs.source_files.len(),
            primaries = request.inputs.primary_source_file_indices.len()
        );

        let response = self.process(id, &request).await;
        match &response {
            CompileResponse::Completed { artifacts } => {
                info!(id, state = %RequestState::Completed, primaries = artifacts.len());
            }
            CompileResponse::Failed { reason, .. } => {
                info!(id, state = %RequestState::Failed, %reason);
            }
        }
        response
    }

    async fn process(&self, id: u64, request: &CompileRequest) -> CompileResponse {
        if let Err(message) = validate(request) {
            return CompileResponse::failed(FailureReason::InvalidRequest, message);
        }

        let version = &request.info.compiler_version;
        let Some(frontend) = self.registry.frontend_for(version) else {
            return CompileResponse::failed(
                FailureReason::NoMatchingCompilerVersion,
                format!("no frontend reports version {version:?}"),
            );
        };
        info!(id, state = %RequestState::VersionMatched, frontend = %frontend.display());

        let sdk_name = &request.info.sdk_platform_and_version;
        let sdk = if sdk_name.is_empty() {
            None
        } else {
            match self.sdks.get(sdk_name) {
                Some(path) => Some(path.as_path()),
                None => {
                    return CompileResponse::failed(
                        FailureReason::SdkNotFound,
                        format!("sdk {sdk_name:?} is not configured"),
                    );
                }
            }
        };

        let _permit = self.admission.admit().await;
        info!(id, state = %RequestState::Admitted, compiling = self.admission.compiling());

        info!(id, state = %RequestState::Compiling);
        let invocation = FrontendInvocation {
            frontend,
            sdk,
            timeout: self.compilation_timeout,
        };
        match compile(request, invocation).await {
            Ok(artifacts) => CompileResponse::Completed { artifacts },
            Err(failure) => CompileResponse::failed(failure.reason, failure.message),
        }
    }

    /// Accept connections until `shutdown` resolves. Each connection is
    /// served on its own task.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            handle_connection(server, stream, peer).await;
                        });
                    }
                    Err(err) => warn!("failed to accept connection: {err}"),
                },
                () = &mut shutdown => {
                    info!("shutting down");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(server: Arc<FlockServer>, mut stream: TcpStream, peer: SocketAddr) {
    debug!(%peer, "connection opened");
    let read = tokio::time::timeout(
        server.request_read_timeout,
        read_frame::<_, CompileRequest>(&mut stream),
    )
    .await;
    let Ok(read) = read else {
        warn!(
            %peer,
            "no complete request within {}s, closing connection",
            server.request_read_timeout.as_secs_f64()
        );
        return;
    };
    let response = match read {
        Ok(request) => server.handle_request(request).await,
        Err(err @ (ProtocolError::Decode(_) | ProtocolError::FrameTooLarge(_))) => {
            warn!(%peer, "rejecting malformed request: {err}");
            CompileResponse::failed(FailureReason::InvalidRequest, err.to_string())
        }
        Err(err) => {
            warn!(%peer, "failed to read request: {err}");
            return;
        }
    };
    if let Err(err) = write_frame(&mut stream, &response).await {
        warn!(%peer, "failed to send response: {err}");
    }
}
