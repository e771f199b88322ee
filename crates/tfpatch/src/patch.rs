//! Attribute overrides and the per-file patch pass
//!
//! A patch run is a pure computation: parse the file, rewrite the targeted
//! attributes in the tree, serialize, and compare against the input. Only
//! when the serialized text differs from the original does anything get
//! written back, which makes every patch idempotent by construction.
//!
//! Files are independent of each other. One file failing to parse or patch
//! never aborts its siblings; the batch helpers hand back one result per
//! path.
use crate::backend::TerraformBackend;
use crate::document::{Body, Document};
use crate::token::ParseError;
use std::path::{Path, PathBuf};

/// Attribute name to literal string value, applied in insertion order.
///
/// An empty spec is a caller error; patch entry points reject it with
/// [PatchError::MissingOverrides] before reading any file.
pub type OverrideSpec = indexmap::IndexMap<String, String>;

#[derive(thiserror::Error, Debug)]
pub enum PatchError {
    #[error("at least one attribute override must be provided")]
    MissingOverrides,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("`{block_type}` block must carry exactly {expected} label(s), found {actual}")]
    WrongLabelCount {
        block_type: String,
        expected: usize,
        actual: usize,
    },
    #[error("failed to read or write {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of patching one file's source text.
#[derive(Debug, derive_new::new)]
pub struct PatchOutcome {
    /// Whether the serialized output differs from the input
    pub changed: bool,
    /// The full serialized configuration text
    pub output: String,
}

/// Per-file result of a batch run.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<bool, PatchError>,
}

/// Sets each named attribute of `body` to its literal value, replacing
/// existing value expressions and appending attributes that are absent.
pub fn apply_overrides(body: &mut Body, overrides: &OverrideSpec) {
    for (name, value) in overrides {
        body.set_string_attribute(name, value);
    }
}

/// Rewrites the given attributes of every `provider "aws"` block.
///
/// Blocks of other providers, and everything around the patched attributes,
/// keep their exact bytes. Repeated `provider "aws"` blocks (aliases) are all
/// patched.
pub fn patch_aws_provider_source(
    source: &str,
    path: impl Into<PathBuf>,
    overrides: &OverrideSpec,
) -> Result<PatchOutcome, PatchError> {
    if overrides.is_empty() {
        return Err(PatchError::MissingOverrides);
    }

    let mut document = Document::parse(source, path)?;
    for block in document.body_mut().matching_blocks_mut("provider", "aws") {
        tracing::debug!(overrides = overrides.len(), "patching aws provider block");
        apply_overrides(block.body_mut(), overrides);
    }

    let output = document.to_string();
    Ok(PatchOutcome::new(output != source, output))
}

/// Rewrites the state location of the `terraform { backend "<type>" { ... } }`
/// configuration, deriving the new value from the module name and optional
/// environment name.
///
/// A file without a backend declaration is left untouched. Unsupported
/// backend types are a logged no-op, not an error.
pub fn patch_backend_source(
    source: &str,
    path: impl Into<PathBuf>,
    module_name: &str,
    env_name: Option<&str>,
) -> Result<PatchOutcome, PatchError> {
    let mut document = Document::parse(source, path)?;

    let backend_block = document
        .body_mut()
        .find_block_mut("terraform")
        .and_then(|terraform| terraform.body_mut().find_block_mut("backend"));
    if let Some(block) = backend_block {
        let mut backend = TerraformBackend::new(block)?;
        backend.update_config(module_name, env_name);
    }

    let output = document.to_string();
    Ok(PatchOutcome::new(output != source, output))
}

/// Patches `provider "aws"` blocks in the file at `path`, writing the file
/// back only when its content changed.
pub fn patch_aws_provider_file(path: &Path, overrides: &OverrideSpec) -> Result<bool, PatchError> {
    if overrides.is_empty() {
        return Err(PatchError::MissingOverrides);
    }

    let source = read_file(path)?;
    let outcome = patch_aws_provider_source(&source, path, overrides)?;
    if outcome.changed {
        tracing::info!(path = %path.display(), "patching aws provider attributes");
        write_file(path, &outcome.output)?;
    }
    Ok(outcome.changed)
}

/// Patches the backend configuration of the file at `path`, writing the file
/// back only when its content changed.
pub fn patch_backend_file(
    path: &Path,
    module_name: &str,
    env_name: Option<&str>,
) -> Result<bool, PatchError> {
    let source = read_file(path)?;
    let outcome = patch_backend_source(&source, path, module_name, env_name)?;
    if outcome.changed {
        tracing::info!(path = %path.display(), "patching remote state configuration");
        write_file(path, &outcome.output)?;
    }
    Ok(outcome.changed)
}

/// Runs the provider patch over a batch of files.
///
/// Fails up front when `overrides` is empty; afterwards every file gets its
/// own independent result.
pub fn patch_aws_provider_files(
    paths: &[PathBuf],
    overrides: &OverrideSpec,
) -> Result<Vec<FileOutcome>, PatchError> {
    if overrides.is_empty() {
        return Err(PatchError::MissingOverrides);
    }

    Ok(paths
        .iter()
        .map(|path| FileOutcome {
            path: path.clone(),
            result: patch_aws_provider_file(path, overrides),
        })
        .collect())
}

/// Runs the backend patch over a batch of files, one independent result per
/// file.
pub fn patch_backend_files(
    paths: &[PathBuf],
    module_name: &str,
    env_name: Option<&str>,
) -> Vec<FileOutcome> {
    paths
        .iter()
        .map(|path| FileOutcome {
            path: path.clone(),
            result: patch_backend_file(path, module_name, env_name),
        })
        .collect()
}

fn read_file(path: &Path) -> Result<String, PatchError> {
    std::fs::read_to_string(path).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, content: &str) -> Result<(), PatchError> {
    std::fs::write(path, content).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn overrides(pairs: &[(&str, &str)]) -> OverrideSpec {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    const TWO_PROVIDERS: &str = concat!(
        "provider \"aws\" {\n",
        "  region = var.aws_region\n",
        "}\n",
        "\n",
        "provider \"google\" {\n",
        "  project = \"p\"\n",
        "}\n",
    );

    #[test]
    fn patches_only_the_aws_provider() {
        let outcome = patch_aws_provider_source(
            TWO_PROVIDERS,
            "main.tf",
            &overrides(&[("region", "us-east-1")]),
        )
        .expect("must patch");

        assert!(outcome.changed);
        assert_eq!(
            outcome.output,
            concat!(
                "provider \"aws\" {\n",
                "  region = \"us-east-1\"\n",
                "}\n",
                "\n",
                "provider \"google\" {\n",
                "  project = \"p\"\n",
                "}\n",
            )
        );
    }

    #[test]
    fn second_pass_reports_unchanged() {
        let spec = overrides(&[("region", "us-east-1")]);
        let first = patch_aws_provider_source(TWO_PROVIDERS, "main.tf", &spec).expect("first");
        let second =
            patch_aws_provider_source(&first.output, "main.tf", &spec).expect("second");
        assert!(!second.changed);
        assert_eq!(second.output, first.output);
    }

    #[test]
    fn patches_every_aliased_aws_block() {
        let source = concat!(
            "provider \"aws\" {\n",
            "  region = \"eu-west-1\"\n",
            "}\n",
            "\n",
            "provider \"aws\" {\n",
            "  alias  = \"replica\"\n",
            "  region = \"eu-west-2\"\n",
            "}\n",
        );
        let outcome =
            patch_aws_provider_source(source, "main.tf", &overrides(&[("region", "us-east-1")]))
                .expect("must patch");
        assert_eq!(outcome.output.matches("\"us-east-1\"").count(), 2);
    }

    #[test]
    fn absent_attributes_are_appended() {
        let source = "provider \"aws\" {\n  region = var.aws_region\n}\n";
        let outcome = patch_aws_provider_source(
            source,
            "main.tf",
            &overrides(&[("region", "us-east-1"), ("skip_metadata_api_check", "true")]),
        )
        .expect("must patch");

        // appended attributes land at the end of the block body, unindented
        assert_eq!(
            outcome.output,
            concat!(
                "provider \"aws\" {\n",
                "  region = \"us-east-1\"\n",
                "skip_metadata_api_check = \"true\"\n",
                "}\n",
            )
        );
    }

    #[test]
    fn empty_override_spec_is_rejected() {
        let err = patch_aws_provider_source("provider \"aws\" {}\n", "main.tf", &overrides(&[]))
            .expect_err("must fail");
        assert!(matches!(err, PatchError::MissingOverrides));

        let err =
            patch_aws_provider_files(&[], &overrides(&[])).expect_err("batch must fail too");
        assert!(matches!(err, PatchError::MissingOverrides));
    }

    #[test]
    fn parse_failure_is_reported_per_file() {
        let err = patch_aws_provider_source("provider \"aws\" {", "broken.tf", &overrides(&[("region", "x")]))
            .expect_err("must fail");
        assert!(matches!(err, PatchError::Parse(_)));
    }

    #[test]
    fn file_without_backend_is_untouched() {
        let source = "provider \"aws\" {\n  region = \"eu-west-1\"\n}\n";
        let outcome =
            patch_backend_source(source, "main.tf", "my-app", None).expect("must succeed");
        assert!(!outcome.changed);
        assert_eq!(outcome.output, source);
    }
}
