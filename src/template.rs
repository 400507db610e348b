use crate::error::{RenderError, Result};
use crate::fs_utils::{read_file_contents, write_output};
use crate::interpreter::Interpreter;
use crate::lexer::tokenize;
use crate::parser::{Stmt, parse};
use crate::scanner::{SegmentKind, TrimMode, scan};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Template read when no path is given
pub const DEFAULT_TEMPLATE_PATH: &str = ".README.erb";

/// Document written when no path is given
pub const DEFAULT_OUTPUT_PATH: &str = "README.md";

/// Configuration for template rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Directory that file built-ins resolve against and may not leave
    pub base_dir: PathBuf,
    /// Which newlines around tags are dropped
    pub trim_mode: TrimMode,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            trim_mode: TrimMode::Dash,
        }
    }
}

/// A tag found in a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateTag {
    /// Code, output or comment
    pub kind: SegmentKind,
    /// The text between the markers
    pub content: String,
    /// Starting byte offset in the template
    pub start: usize,
    /// Ending byte offset in the template
    pub end: usize,
    /// Line the tag opens on (1-based)
    pub line: usize,
}

/// Finds every tag in the given template
///
/// # Errors
///
/// Returns `RenderError::Syntax` if a tag is never closed.
pub fn find_tags(template: &str, trim_mode: TrimMode) -> Result<Vec<TemplateTag>> {
    Ok(scan(template, trim_mode)?
        .into_iter()
        .filter(|segment| segment.kind != SegmentKind::Text)
        .map(|segment| TemplateTag {
            kind: segment.kind,
            content: segment.content,
            start: segment.start,
            end: segment.end,
            line: segment.line,
        })
        .collect())
}

/// Scans, tokenizes and parses a template into a program
///
/// # Errors
///
/// Returns `RenderError::Syntax` for malformed tags or code.
pub fn compile(template: &str, trim_mode: TrimMode) -> Result<Vec<Stmt>> {
    let segments = scan(template, trim_mode)?;
    parse(tokenize(&segments)?)
}

/// Renders a template string
///
/// Nothing is written anywhere; the whole result is built in memory.
///
/// # Errors
///
/// - `RenderError::Syntax` if the template cannot be parsed.
/// - `RenderError::Eval` if embedded code fails while running.
/// - I/O, path, YAML or JSON errors raised by built-ins the template calls.
pub fn render_template(template: &str, config: &RenderConfig) -> Result<String> {
    let program = compile(template, config.trim_mode)?;
    tracing::debug!(
        statements = program.len(),
        trim_mode = ?config.trim_mode,
        "template compiled"
    );
    Interpreter::new(&config.base_dir).run(&program)
}

/// Render a template from a file
///
/// # Errors
///
/// - `RenderError::FileNotFound` if the template file doesn't exist.
/// - Other errors from `read_file_contents` or `render_template`.
pub fn render_template_file(template_path: &Path, config: &RenderConfig) -> Result<String> {
    tracing::debug!(template = %template_path.display(), "reading template");
    let template = read_file_contents(template_path)?;
    render_template(&template, config)
}

/// Renders `template_path` and overwrites `output_path` with the result
///
/// The output is only opened once rendering has succeeded, so a failing
/// template leaves any existing output untouched.
///
/// # Errors
///
/// Returns any error from `render_template_file`, or `RenderError::Io` if the
/// output cannot be written.
pub fn render_to_file(template_path: &Path, output_path: &Path, config: &RenderConfig) -> Result<()> {
    let rendered = render_template_file(template_path, config)?;
    write_output(output_path, &rendered)?;
    tracing::info!(
        template = %template_path.display(),
        output = %output_path.display(),
        bytes = rendered.len(),
        "rendered"
    );
    Ok(())
}

/// Compares freshly rendered text with what is already at `output_path`
///
/// # Errors
///
/// Returns `RenderError::OutOfDate` if the file is missing or differs.
pub fn check_output(output_path: &Path, rendered: &str) -> Result<()> {
    let current = match read_file_contents(output_path) {
        Ok(current) => Some(current),
        Err(RenderError::FileNotFound { .. }) => None,
        Err(e) => return Err(e),
    };
    if current.as_deref() == Some(rendered) {
        tracing::info!(output = %output_path.display(), "up to date");
        Ok(())
    } else {
        Err(RenderError::OutOfDate {
            path: output_path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_env() -> (TempDir, RenderConfig) {
        let temp_dir = TempDir::new().unwrap();
        let config = RenderConfig {
            base_dir: temp_dir.path().to_path_buf(),
            trim_mode: TrimMode::Dash,
        };
        (temp_dir, config)
    }

    #[test]
    fn test_version_expression() {
        let (_temp_dir, config) = create_test_env();
        assert_eq!(
            render_template("Version: <%= 1+1 %>", &config).unwrap(),
            "Version: 2"
        );
    }

    #[test]
    fn test_plain_template_is_identity() {
        let (_temp_dir, config) = create_test_env();
        let template = "# Title\n\nSome *markdown* with 100% literal text, {{ braces }} and %> marks.\r\n\nlast line without newline";
        assert_eq!(render_template(template, &config).unwrap(), template);
        assert_eq!(render_template("", &config).unwrap(), "");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let (temp_dir, config) = create_test_env();
        fs::write(temp_dir.path().join("b.txt"), "").unwrap();
        fs::write(temp_dir.path().join("a.txt"), "").unwrap();
        let template = "<% files = Dir.glob(\"*.txt\") -%>\n<% files.each do |f| -%>\n* <%= f %>\n<% end -%>\n<%= { \"x\" => 1, \"y\" => [1, 2] } %>\n";

        let first = render_template(template, &config).unwrap();
        let second = render_template(template, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "* a.txt\n* b.txt\n{\"x\" => 1, \"y\" => [1, 2]}\n");
    }

    #[test]
    fn test_dash_trim_and_escapes() {
        let (_temp_dir, config) = create_test_env();
        let template = "<%# a comment -%>\nList:\n<% [1, 2].each do |n| -%>\n  <%- if n.even? -%>\n- even <%= n %>\n  <%- end -%>\n<% end -%>\nLiteral <%% tag %>\n";
        assert_eq!(
            render_template(template, &config).unwrap(),
            "List:\n- even 2\nLiteral <% tag %>\n"
        );
    }

    #[test]
    fn test_trim_modes() {
        let (_temp_dir, mut config) = create_test_env();
        let template = "<% if true %>\nyes\n<% end %>\n";

        config.trim_mode = TrimMode::None;
        assert_eq!(render_template(template, &config).unwrap(), "\nyes\n\n");

        config.trim_mode = TrimMode::Gt;
        assert_eq!(render_template(template, &config).unwrap(), "yes\n");

        config.trim_mode = TrimMode::LtGt;
        assert_eq!(
            render_template("a <%= 1 %>\n<% x = 2 %>\n<%= x %>\n", &config).unwrap(),
            "a 1\n2"
        );
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let (_temp_dir, config) = create_test_env();
        let err = render_template("ok\nstill ok\n<% if %>\n", &config).unwrap_err();
        assert!(matches!(err, RenderError::Syntax { line: 3, .. }));

        let err = render_template("unclosed <%= 1", &config).unwrap_err();
        assert!(matches!(err, RenderError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_find_tags() {
        let template = "a <%= x %>\n<%# note %>\n<% y = 1 -%>\n<%% literal";
        let tags = find_tags(template, TrimMode::Dash).unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].kind, SegmentKind::Output);
        assert_eq!(tags[0].content.trim(), "x");
        assert_eq!(tags[0].start, 2);
        assert_eq!(&template[tags[0].start..tags[0].end], "<%= x %>");
        assert_eq!(tags[1].kind, SegmentKind::Comment);
        assert_eq!(tags[1].line, 2);
        assert_eq!(tags[2].kind, SegmentKind::Code);
        assert_eq!(tags[2].line, 3);

        assert!(find_tags("no tags", TrimMode::Dash).unwrap().is_empty());
    }

    #[test]
    fn test_render_to_file() {
        let (temp_dir, config) = create_test_env();
        let template_path = temp_dir.path().join(DEFAULT_TEMPLATE_PATH);
        let output_path = temp_dir.path().join(DEFAULT_OUTPUT_PATH);

        fs::write(&template_path, "Version: <%= 1+1 %>\n").unwrap();
        fs::write(&output_path, "stale and much longer content\n").unwrap();
        render_to_file(&template_path, &output_path, &config).unwrap();
        assert_eq!(fs::read_to_string(&output_path).unwrap(), "Version: 2\n");
    }

    #[test]
    fn test_failed_render_leaves_output_untouched() {
        let (temp_dir, config) = create_test_env();
        let template_path = temp_dir.path().join(DEFAULT_TEMPLATE_PATH);
        let output_path = temp_dir.path().join(DEFAULT_OUTPUT_PATH);

        fs::write(&template_path, "before\n<%= undefined_thing %>\n").unwrap();
        fs::write(&output_path, "previous").unwrap();
        let err = render_to_file(&template_path, &output_path, &config).unwrap_err();
        assert!(matches!(err, RenderError::Eval { line: 2, .. }));
        assert_eq!(fs::read_to_string(&output_path).unwrap(), "previous");
    }

    #[test]
    fn test_missing_template_creates_no_output() {
        let (temp_dir, config) = create_test_env();
        let output_path = temp_dir.path().join(DEFAULT_OUTPUT_PATH);

        let err = render_to_file(
            &temp_dir.path().join(DEFAULT_TEMPLATE_PATH),
            &output_path,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::FileNotFound { .. }));
        assert!(!output_path.exists());
    }

    #[test]
    fn test_check_output() {
        let (temp_dir, _config) = create_test_env();
        let output_path = temp_dir.path().join(DEFAULT_OUTPUT_PATH);

        assert!(matches!(
            check_output(&output_path, "x"),
            Err(RenderError::OutOfDate { .. })
        ));
        fs::write(&output_path, "x").unwrap();
        assert!(check_output(&output_path, "x").is_ok());
        assert!(matches!(
            check_output(&output_path, "y"),
            Err(RenderError::OutOfDate { .. })
        ));
    }
}
