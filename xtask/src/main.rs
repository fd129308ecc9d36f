//! Build automation tasks for the chain archiver
//!
//! Currently generates the CLI reference from the clap definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for the chain archiver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<archiver::Cli>();

    let content = format!(
        r#"# chain-archiver CLI Reference

Generated from the CLI source code on {}.

## Overview

`chain-archiver` exports the tables a lily node derives from the Filecoin
chain into an archive, one UTC day per directory. Each day is walked once,
every task's output is checked against the walk's processing report, and
verified tables are gzip compressed into
`<ship-path>/<network>/csv/<schema>/<table>/<year>/<table>-<date>.csv.gz`.

## Quick Start

```bash
# Export every day from genesis, forever
chain-archiver run \
  --storage-path /var/lib/lily/export \
  --ship-path /mnt/archive \
  --lily-api /ip4/127.0.0.1/tcp/1234 \
  --lily-api-token "$LILY_TOKEN"

# Inspect what a day should produce and what is already archived
chain-archiver manifest --date 2021-03-01 \
  --storage-path /var/lib/lily/export \
  --ship-path /mnt/archive
```

Every option can also be set through its `ARCHIVER_*` environment variable
or a `.env` file in the working directory.

## Commands

{}

## Environment Variables

- `RUST_LOG` - Log filter (e.g., `debug`, `archiver=trace`)
- `LOG_FORMAT` - `text` or `json`
- `LOG_OUTPUT` - `console`, `file` or `both`

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
