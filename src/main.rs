use clap::{Parser, ValueEnum};
use erbdoc::{
    DEFAULT_OUTPUT_PATH, DEFAULT_TEMPLATE_PATH, RenderConfig, Result, TrimMode, check_output,
    find_tags, fs_utils, render_template, render_to_file,
};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

const LONG_HELP: &str = r#"
Tags:
  <% code %>     - Run code, insert nothing
  <%= expr %>    - Insert the value of an expression
  <%# note %>    - Comment, insert nothing
  <%%            - Literal "<%"
  -%> / <%-      - Drop the newline after / indentation before a tag

Built-ins:
  File.read(path), File.exist?(path), File.basename(path), File.join(a, b)
  Dir.glob("src/**/*.rs"), YAML.load_file(path), JSON.parse(text)

Examples:
  # Render .README.erb into README.md
  erbdoc
  # Fail when README.md does not match the template (CI)
  erbdoc --check
  # Render a template from stdin to stdout
  echo "Version: <%= 1+1 %>" | erbdoc --template - --output -
  # List all tags in the template
  erbdoc --list
  # Output as JSON for scripting
  erbdoc --list=json
  # Resolve file built-ins against another directory
  erbdoc --base-dir /path/to/project

Template example:
  # <%= File.basename(Dir.glob("*.gemspec").first.to_s, ".gemspec") %>
  <% YAML.load_file("docs/features.yml").each do |name, text| -%>
  - **<%= name %>**: <%= text %>
  <% end -%>
"#;

/// Render a README from an embedded-code template.
#[derive(Parser, Debug)]
#[command(
    name = "erbdoc",
    version,
    about = "Render an embedded-code template (.README.erb) into README.md.",
    after_long_help = LONG_HELP
)]
struct Cli {
    /// Template file to render. Use '-' for stdin.
    #[arg(long, short, value_name = "TEMPLATE", default_value = DEFAULT_TEMPLATE_PATH)]
    template: PathBuf,

    /// Output file. Use '-' for stdout.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// Base directory for files read by the template (defaults to CWD)
    #[arg(short, long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Which newlines next to tags are removed
    #[arg(long, value_enum, value_name = "MODE", default_value = "dash")]
    trim_mode: TrimModeArg,

    /// Render and compare with the existing output instead of writing it
    #[arg(long, conflicts_with = "list")]
    check: bool,

    /// List tags in the template (optionally with format: plain, json)
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "plain")]
    list: Option<ListFormat>,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum TrimModeArg {
    /// `-%>` and `<%-` trim newlines and indentation
    Dash,
    /// Keep all text as written
    None,
    /// Drop the newline after every tag
    Gt,
    /// Drop the newline after tags that start a line
    Ltgt,
}

impl From<TrimModeArg> for TrimMode {
    fn from(arg: TrimModeArg) -> Self {
        match arg {
            TrimModeArg::Dash => TrimMode::Dash,
            TrimModeArg::None => TrimMode::None,
            TrimModeArg::Gt => TrimMode::Gt,
            TrimModeArg::Ltgt => TrimMode::LtGt,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum ListFormat {
    /// One tag per line
    Plain,
    /// JSON output for scripting
    Json,
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn is_stdio(path: &Path) -> bool {
    path == Path::new("-")
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(format) = cli.list {
        let template = read_template(&cli.template)?;
        return list_tags(&template, format, cli.trim_mode.into());
    }

    let mut config = RenderConfig {
        trim_mode: cli.trim_mode.into(),
        ..RenderConfig::default()
    };
    if let Some(dir) = &cli.base_dir {
        config.base_dir = dir.canonicalize()?;
    }
    tracing::debug!(base_dir = %config.base_dir.display(), "configuration ready");

    if !cli.check && !is_stdio(&cli.template) && !is_stdio(&cli.output) {
        return render_to_file(&cli.template, &cli.output, &config);
    }

    let template = read_template(&cli.template)?;
    let rendered = render_template(&template, &config)?;

    if cli.check {
        if is_stdio(&cli.output) {
            tracing::warn!("--check with stdout output has nothing to compare against");
            return Ok(());
        }
        return check_output(&cli.output, &rendered);
    }

    if is_stdio(&cli.output) {
        print!("{rendered}");
        io::stdout().flush()?;
    } else {
        fs_utils::write_output(&cli.output, &rendered)?;
    }
    Ok(())
}

fn read_template(path: &Path) -> Result<String> {
    if is_stdio(path) {
        tracing::info!("reading template from stdin");
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        tracing::info!(template = %path.display(), "reading template");
        fs_utils::read_file_contents(path)
    }
}

fn list_tags(template: &str, format: ListFormat, trim_mode: TrimMode) -> Result<()> {
    tracing::debug!("listing template tags");
    let tags = find_tags(template, trim_mode)?;

    match format {
        ListFormat::Plain => {
            for tag in &tags {
                let marker = match tag.kind {
                    erbdoc::SegmentKind::Output => "<%=",
                    erbdoc::SegmentKind::Comment => "<%#",
                    _ => "<%",
                };
                println!("{}: {marker} {} %>", tag.line, tag.content.trim());
            }
        }
        ListFormat::Json => {
            let json = serde_json::to_string_pretty(&tags)?;
            println!("{json}");
        }
    }

    Ok(())
}
