//! Per-backend override policy for remote state configuration
//!
//! Each supported backend type stores its state under a single configurable
//! key (a file path, an object key or a workspace name). The policy picks
//! that key and computes its new value from the module name, the optional
//! environment name and whatever the configuration already contained.
use crate::document::{Attribute, Block, Body};
use crate::patch::PatchError;
use crate::token::{Token, TokenKind};

/// State file name used when the original configuration names none.
const DEFAULT_STATE_FILE: &str = "terraform.tfstate";

/// A located `backend "<type>" { ... }` block, borrowed for the duration of
/// one patch.
pub struct TerraformBackend<'a> {
    backend_type: String,
    config: &'a mut Body,
}

/// Which piece of a backend's configuration names the state location.
/// One variant per supported backend type; everything else is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPolicy {
    Local,
    AzureRm,
    Consul,
    Gcs,
    S3,
    Remote,
    Unsupported,
}

impl BackendPolicy {
    pub fn resolve(backend_type: &str) -> Self {
        match backend_type {
            "local" => BackendPolicy::Local,
            "azurerm" => BackendPolicy::AzureRm,
            "consul" => BackendPolicy::Consul,
            "gcs" => BackendPolicy::Gcs,
            "s3" => BackendPolicy::S3,
            "remote" => BackendPolicy::Remote,
            // cos, http, kubernetes, oss, pg, and anything new
            _ => BackendPolicy::Unsupported,
        }
    }
}

impl<'a> TerraformBackend<'a> {
    /// Builds a descriptor from a located backend block, which must carry
    /// exactly one label: the backend type.
    pub fn new(block: &'a mut Block) -> Result<Self, PatchError> {
        if block.labels().len() != 1 {
            return Err(PatchError::WrongLabelCount {
                block_type: block.ident().to_string(),
                expected: 1,
                actual: block.labels().len(),
            });
        }
        let backend_type = block.labels()[0].value().to_string();
        Ok(Self {
            backend_type,
            config: block.body_mut(),
        })
    }

    pub fn backend_type(&self) -> &str {
        &self.backend_type
    }

    /// Rewrites the state location according to this backend's policy.
    ///
    /// Unsupported backend types log a warning and leave the configuration
    /// untouched; new backend types must not hard-fail the tool.
    pub fn update_config(&mut self, module_name: &str, env_name: Option<&str>) {
        tracing::debug!(backend = %self.backend_type, "updating backend config");
        match BackendPolicy::resolve(&self.backend_type) {
            BackendPolicy::Local | BackendPolicy::Consul => {
                self.update_state_attribute("path", module_name, env_name)
            }
            BackendPolicy::AzureRm | BackendPolicy::S3 => {
                self.update_state_attribute("key", module_name, env_name)
            }
            BackendPolicy::Gcs => self.update_state_attribute("prefix", module_name, env_name),
            BackendPolicy::Remote => self.update_workspace_name(module_name, env_name),
            BackendPolicy::Unsupported => {
                tracing::warn!(
                    backend = %self.backend_type,
                    "backend type is not yet supported, update its state configuration manually"
                );
            }
        }
    }

    fn update_state_attribute(
        &mut self,
        attr_name: &str,
        module_name: &str,
        env_name: Option<&str>,
    ) {
        let original = self
            .config
            .get_attribute(attr_name)
            .and_then(Attribute::value_as_string);
        let new_value = format_state_path(module_name, env_name, original.as_deref());

        tracing::debug!(
            backend = %self.backend_type,
            attribute = attr_name,
            value = %new_value,
            "setting state location"
        );
        self.config.set_string_attribute(attr_name, &new_value);
    }

    /// The `remote` backend names its state through `workspaces.name`; the
    /// nested block is created when missing.
    fn update_workspace_name(&mut self, module_name: &str, env_name: Option<&str>) {
        let workspaces = if self.config.find_block("workspaces").is_some() {
            self.config.find_block_mut("workspaces").unwrap()
        } else {
            self.config.append_block(Block::empty("workspaces"))
        };

        let original = workspaces
            .body()
            .get_attribute("name")
            .and_then(Attribute::value_as_string);
        let name = format_workspace(module_name, env_name, original.as_deref());

        tracing::debug!(workspace = %name, "setting remote backend workspace");
        workspaces.body_mut().set_string_attribute("name", &name);
    }

    /// A synthetic body describing this backend for a remote-state data
    /// source: `backend = "<type>"` plus a `config` attribute carrying the
    /// full original configuration between a fresh pair of braces.
    ///
    /// The configuration tokens are copied verbatim, never reparsed, so the
    /// embedded copy keeps its comments and formatting.
    pub fn data_source_body(&self) -> Body {
        let mut body = Body::default();
        body.set_string_attribute("backend", &self.backend_type);

        let mut config = vec![Token::new(TokenKind::OBrace, "{")];
        config.extend(self.config.to_tokens());
        config.push(Token::new(TokenKind::CBrace, "}"));
        body.append_raw_attribute("config", config);

        body
    }
}

/// `envName? + "/" + moduleName + "/" + (original ?? "terraform.tfstate")`
pub fn format_state_path(
    module_name: &str,
    env_name: Option<&str>,
    original: Option<&str>,
) -> String {
    let mut out = module_name.to_string();
    if let Some(env) = env_name {
        out = format!("{env}/{out}");
    }
    format!("{out}/{}", original.unwrap_or(DEFAULT_STATE_FILE))
}

/// `(envName? + "-" + moduleName) + ("-" + original)?`
pub fn format_workspace(
    module_name: &str,
    env_name: Option<&str>,
    original: Option<&str>,
) -> String {
    let mut out = module_name.to_string();
    if let Some(env) = env_name {
        out = format!("{env}-{out}");
    }
    if let Some(original) = original {
        out = format!("{out}-{original}");
    }
    out
}
