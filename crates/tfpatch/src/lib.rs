//! # tfpatch - format-preserving terraform configuration patching
//!
//! For CLI usage see the project README.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `tfpatch` works internally.
//!
//! ### HCL Terms
//!
//! Quick introduction to terms used to describe elements of the patched
//! files.
//!
//! In hcl terms...
//! - a file gets parsed as a `body`
//! - ...which is just a list of `structures`
//! - ...where there are two kinds:
//!   - `attribute`: a "key = value" pair
//!   - or `block`:
//!     - 1 `identifier`
//!     - followed by 0 or more `labels`
//!     - and a `body` enclosed in `{` and `}`
//!
//! ### Parsing without losing a byte
//!
//! Most HCL tooling parses a file into values and throws the text away.
//! `tfpatch` cannot do that: its whole job is to rewrite one or two
//! attributes and leave every other byte alone, comments and odd formatting
//! included.
//!
//! So [token] lexes the file into a stream where *every* input byte belongs
//! to exactly one token - whitespace, newlines and comments are tokens too.
//! [document] then shapes that stream into a tree of bodies, blocks and
//! attributes, where each node keeps the trivia around it in its own decor
//! fields. Serializing the tree just writes the tokens back out, so an
//! untouched tree reproduces its source exactly.
//!
//! ### Patching
//!
//! A patch run parses one file, finds its target blocks, swaps the value
//! tokens of the targeted attributes for quoted literals, serializes and
//! compares against the input ([patch]). The byte comparison is what makes
//! patching idempotent: re-running a patch over an already patched file
//! changes nothing and writes nothing.
//!
//! Two kinds of targets exist:
//! - every `provider "aws"` block, patched with a caller-supplied
//!   attribute/value mapping ([patch::OverrideSpec])
//! - the `terraform { backend "<type>" { ... } }` block, where the attribute
//!   to rewrite and its new value are decided per backend type ([backend])
//!
//! ```
//! let source = "provider \"aws\" {\n  region = var.aws_region\n}\n";
//!
//! let mut overrides = tfpatch::patch::OverrideSpec::new();
//! overrides.insert("region".to_string(), "eu-west-1".to_string());
//!
//! let outcome = tfpatch::patch::patch_aws_provider_source(source, "main.tf", &overrides).unwrap();
//! assert!(outcome.changed);
//! assert_eq!(outcome.output, "provider \"aws\" {\n  region = \"eu-west-1\"\n}\n");
//! ```
pub mod backend;
pub mod document;
pub mod patch;
pub mod token;
