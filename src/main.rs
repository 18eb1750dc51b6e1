use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;

use pgcopy::copy::PgCopyConnection;
use pgcopy::host::{self, CopyParameters, InputItem, OutputItem};
use pgcopy::{CopyConfig, CopyError, CopyResult, Credentials};

#[derive(Parser, Debug)]
#[command(
    name = "pgcopy",
    about = "Stream CSV/TSV data into and out of PostgreSQL with COPY"
)]
struct Args {
    /// JSON parameter bag (operation, query or table, format options).
    #[arg(long)]
    params: PathBuf,

    /// JSON array of input items; a single empty item is used when omitted.
    #[arg(long)]
    items: Option<PathBuf>,

    /// JSON credentials record; PG* environment variables are used when omitted.
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Directory to write export attachments into.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CopyResult<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_attachments(dir: &Path, output: &[OutputItem]) -> CopyResult<()> {
    std::fs::create_dir_all(dir)?;
    for (index, item) in output.iter().enumerate() {
        for (field, attachment) in &item.binary {
            let name = attachment
                .file_name
                .clone()
                .unwrap_or_else(|| format!("{field}-{index}"));
            let path = dir.join(name);
            std::fs::write(&path, attachment.decode()?)?;
            log::info!("wrote {} ({} bytes)", path.display(), attachment.file_size.unwrap_or(0));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pgcopy::init_logger();

    let args = Args::parse();
    let params: CopyParameters = read_json(&args.params)?;
    let items: Vec<InputItem> = match &args.items {
        Some(path) => read_json(path)?,
        None => vec![InputItem::default()],
    };
    let credentials = match &args.credentials {
        Some(path) => Credentials::from_file(path)?,
        None => Credentials::from_env()?,
    };
    let config = CopyConfig::from_env();

    log::info!(
        "pgcopy: {} on {}:{}/{} ({} items, timeout {:?})",
        params.operation,
        credentials.host,
        credentials.port,
        credentials.database,
        items.len(),
        config.timeout
    );

    let conn = PgCopyConnection::connect(&credentials.connect_options()).await?;
    let output = match host::run_invocation(conn, &params, &items, &config).await {
        Ok(output) => output,
        Err(err) => {
            writeln!(io::stderr(), "error: {err}")?;
            if matches!(err, CopyError::UnsupportedOperation(_) | CopyError::InvalidParameter(_)) {
                std::process::exit(2);
            }
            std::process::exit(1);
        }
    };

    if let Some(dir) = &args.output_dir {
        write_attachments(dir, &output)?;
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
