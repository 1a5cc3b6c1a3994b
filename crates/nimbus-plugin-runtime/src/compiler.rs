//! Compiler dispatcher.
//!
//! Resolves a language's compiler binding, fills in the argument template
//! and hands the job to the external compile service. Nothing is executed
//! locally.

use crate::languages::LanguageRegistry;
use async_trait::async_trait;
use nimbus_config::CompilerServiceConfig;
use nimbus_core::{with_timeout, NimbusError, NimbusResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SERVICE: &str = "compile-service";

/// Replaced by the file name.
pub const FILE_PLACEHOLDER: &str = "${file}";
/// Replaced by the file name without its final extension.
pub const BASENAME_PLACEHOLDER: &str = "${fileBasenameNoExtension}";

/// Body sent to the compile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub command: String,
    pub args: Vec<String>,
    pub code: String,
    pub file_name: String,
    pub working_directory: Option<String>,
    pub environment: Option<BTreeMap<String, String>>,
}

/// Successful compile endpoint reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResponse {
    pub output: String,
}

/// External service that compiles and runs user programs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompileService: Send + Sync {
    async fn compile(&self, request: CompileRequest) -> NimbusResult<CompileResponse>;
}

/// [`CompileService`] speaking JSON over HTTP.
pub struct HttpCompileService {
    client: Client,
    endpoint: String,
}

impl HttpCompileService {
    pub fn new(config: &CompilerServiceConfig) -> NimbusResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| NimbusError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, &config.endpoint))
    }

    pub fn with_client(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CompileService for HttpCompileService {
    async fn compile(&self, request: CompileRequest) -> NimbusResult<CompileResponse> {
        debug!(command = %request.command, file_name = %request.file_name, "HTTP Compile");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| NimbusError::external(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown status");
            return Err(NimbusError::Compilation(reason.to_string()));
        }

        response
            .json()
            .await
            .map_err(|e| NimbusError::Internal(format!("JSON parse error: {e}")))
    }
}

/// Routes compile-and-run requests through the language registry.
#[derive(Clone)]
pub struct CompilerDispatcher {
    languages: LanguageRegistry,
    service: Arc<dyn CompileService>,
    timeout: Duration,
}

impl CompilerDispatcher {
    pub fn new(languages: LanguageRegistry, service: Arc<dyn CompileService>, timeout: Duration) -> Self {
        Self {
            languages,
            service,
            timeout,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Compiles and runs `code` as `file_name` using the compiler bound to
    /// `language_id`, returning the service's output verbatim.
    ///
    /// Fails with [`NimbusError::CompilerConfigMissing`] before any network
    /// call when the language has no compiler.
    pub async fn compile_and_run(&self, language_id: &str, code: &str, file_name: &str) -> NimbusResult<String> {
        let compiler = self
            .languages
            .get(language_id)
            .and_then(|language| language.compiler)
            .ok_or_else(|| NimbusError::CompilerConfigMissing(language_id.to_string()))?;

        let request = CompileRequest {
            args: compiler
                .args
                .iter()
                .map(|arg| substitute_placeholders(arg, file_name))
                .collect(),
            command: compiler.command,
            code: code.to_string(),
            file_name: file_name.to_string(),
            working_directory: compiler.working_directory,
            environment: compiler.environment,
        };
        info!(language = %language_id, command = %request.command, args = ?request.args, "Dispatching compile request");

        let operation = format!("compile of {file_name}");
        let service = Arc::clone(&self.service);
        let result = with_timeout(self.timeout, &operation, || service.compile(request)).await;

        match result {
            Ok(response) => Ok(response.output),
            Err(e) => {
                warn!(language = %language_id, error = %e, "Compile request failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for CompilerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerDispatcher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Expands `${file}` and `${fileBasenameNoExtension}` in one argument.
///
/// The scan is single-pass, so a file name that itself contains a
/// placeholder is never expanded again. Other `${...}` tokens are kept.
#[must_use]
pub fn substitute_placeholders(arg: &str, file_name: &str) -> String {
    let mut output = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let token = &rest[start..];

        if token.starts_with(FILE_PLACEHOLDER) {
            output.push_str(file_name);
            rest = &token[FILE_PLACEHOLDER.len()..];
        } else if token.starts_with(BASENAME_PLACEHOLDER) {
            output.push_str(basename_without_extension(file_name));
            rest = &token[BASENAME_PLACEHOLDER.len()..];
        } else {
            output.push_str("${");
            rest = &token[2..];
        }
    }

    output.push_str(rest);
    output
}

/// Strips the final extension. Dotfiles such as `.env` keep their name.
fn basename_without_extension(file_name: &str) -> &str {
    let name_start = file_name.rfind('/').map_or(0, |i| i + 1);
    match file_name.rfind('.') {
        Some(dot) if dot > name_start && dot + 1 < file_name.len() => &file_name[..dot],
        _ => file_name,
    }
}
