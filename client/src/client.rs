use crate::config::ClientConfiguration;
use crate::config::ServerDescriptor;
use crate::error::ClientError;
use crate::error::Result;
use async_trait::async_trait;
use flock_core::FlockErr;
use flock_core::RemoteExecutor;
use flock_core::executor::IndexedOutputPaths;
use flock_core::executor::find_missing_artifact;
use flock_core::executor::write_artifacts;
use flock_protocol::CompileArtifacts;
use flock_protocol::CompileRequest;
use flock_protocol::CompileResponse;
use flock_protocol::read_frame;
use flock_protocol::write_frame;
use tokio::net::TcpStream;
use tracing::debug;
use tracing::info;

/// Talks to the first configured server. One request per build, no retries.
#[derive(Debug, Clone)]
pub struct DistributedBuildClient {
    configuration: ClientConfiguration,
}

impl DistributedBuildClient {
    pub fn new(configuration: ClientConfiguration) -> Self {
        Self { configuration }
    }

    /// Send `request`, wait for the response within the server's timeout, and
    /// write every artifact listed in `output_paths`.
    pub async fn compile(
        &self,
        request: &CompileRequest,
        output_paths: &IndexedOutputPaths,
    ) -> Result<CompileArtifacts> {
        let server = self
            .configuration
            .servers
            .first()
            .ok_or(ClientError::NoServersConfigured)?;

        info!(
            server = %server.address(),
            primaries = request.inputs.primary_source_file_indices.len(),
            "sending remote compilation request"
        );
        let response = tokio::time::timeout(server.timeout(), exchange(server, request))
            .await
            .map_err(|_| ClientError::Timeout {
                address: server.address(),
                seconds: server.timeout_seconds,
            })??;

        let artifacts = match response {
            CompileResponse::Completed { artifacts } => artifacts,
            CompileResponse::Failed { reason, message } => {
                return Err(ClientError::ServerFailure { reason, message });
            }
        };

        if let Some((path, kind)) = find_missing_artifact(&artifacts, output_paths) {
            return Err(ClientError::MissingArtifact { path, kind });
        }
        write_artifacts(&artifacts, output_paths).await?;
        Ok(artifacts)
    }
}

async fn exchange(server: &ServerDescriptor, request: &CompileRequest) -> Result<CompileResponse> {
    let address = server.address();
    let mut stream = TcpStream::connect((server.host.as_str(), server.port))
        .await
        .map_err(|source| ClientError::ConnectionFailed {
            address: address.clone(),
            source,
        })?;
    debug!(%address, "connected");

    write_frame(&mut stream, request).await?;
    let response = read_frame(&mut stream).await?;
    Ok(response)
}

#[async_trait]
impl RemoteExecutor for DistributedBuildClient {
    async fn dispatch(
        &self,
        request: CompileRequest,
        output_paths: &IndexedOutputPaths,
    ) -> flock_core::Result<CompileArtifacts> {
        self.compile(&request, output_paths)
            .await
            .map_err(|err| FlockErr::Dispatch(Box::new(err)))
    }
}
