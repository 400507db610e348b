//! # erbdoc
//!
//! Renders a documentation file from an embedded-code template. The default
//! run reads `.README.erb`, evaluates its `<% %>` tags and writes `README.md`.
//!
//! ## Features
//!
//! - ERB tag syntax: `<% code %>`, `<%= expr %>`, `<%# comment %>`, `<%%`
//! - Trim modes, with `-%>` / `<%-` enabled by default
//! - A small Ruby-flavoured expression language with blocks, loops and conditionals
//! - `File`, `Dir`, `YAML` and `JSON` built-ins confined to a base directory
//! - Output is rendered fully in memory before anything is written
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```no_run
//! use erbdoc::{RenderConfig, render_template};
//!
//! let template = "Version: <%= File.read(\"VERSION\").strip %>\n";
//! let config = RenderConfig::default();
//!
//! match render_template(template, &config) {
//!     Ok(result) => print!("{result}"),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! ```
//!
//! ### As a CLI Tool
//!
//! ```bash
//! # Render .README.erb into README.md
//! erbdoc
//!
//! # Fail if README.md is stale
//! erbdoc --check
//!
//! # Render another template to stdout
//! erbdoc -t docs/index.md.erb -o -
//! ```

pub mod builtins;
pub mod error;
pub mod fs_utils;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod scanner;
pub mod template;
pub mod value;

// Re-export main types and functions for convenience
pub use error::{RenderError, Result};
pub use scanner::{SegmentKind, TrimMode};
pub use template::{
    DEFAULT_OUTPUT_PATH, DEFAULT_TEMPLATE_PATH, RenderConfig, TemplateTag, check_output, compile,
    find_tags, render_template, render_template_file, render_to_file,
};
pub use value::Value;
