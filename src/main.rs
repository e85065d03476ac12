use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mlld::fs::OsFs;
use mlld::mlld::{Mlld, MlldOptions};
use mlld::resolver::LocalResolver;

#[derive(Parser)]
#[command(name = "mlld")]
#[command(about = "Run executable-markdown documents")]
#[command(version)]
struct Cli {
    /// Interpret the source from a command line argument
    #[arg(short = 'c')]
    source: Option<String>,

    /// Tolerate undefined references and recoverable parse errors
    #[arg(long = "permissive")]
    permissive: bool,

    /// Project root for @base and relative paths (defaults to the cwd)
    #[arg(long = "base")]
    base: Option<String>,

    /// Directory backing the @local/ module prefix
    #[arg(long = "modules")]
    modules: Option<String>,

    /// Write the artifact to this path instead of stdout
    #[arg(short = 'o', long = "out")]
    out: Option<String>,

    /// Output a JSON object (output, checkpoints)
    #[arg(long = "json")]
    json: bool,

    /// Source document to interpret
    #[arg()]
    source_file: Option<String>,
}

fn init_tracing() {
    let filter = if std::env::var("MLLD_DEBUG").is_ok() {
        EnvFilter::new("mlld=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let base = cli.base.unwrap_or_else(|| {
        std::env::current_dir()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "/".to_string())
    });

    // Determine the source: -c, file, or stdin
    let (source, file) = if let Some(s) = cli.source {
        (s, None)
    } else if let Some(ref path) = cli.source_file {
        match std::fs::read_to_string(path) {
            Ok(content) => (content, Some(path.clone())),
            Err(e) => {
                eprintln!("error: cannot read source file: {}: {}", path, e);
                std::process::exit(1);
            }
        }
    } else {
        use std::io::{IsTerminal, Read};
        if std::io::stdin().is_terminal() {
            eprintln!("error: no source provided. Use -c 'source', a source file, or pipe via stdin.");
            std::process::exit(1);
        }
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer).unwrap_or_default();
        (buffer, None)
    };

    let fs = Arc::new(OsFs::new());
    let mut resolver = LocalResolver::new(fs.clone());
    if let Some(modules) = &cli.modules {
        resolver = resolver.with_prefix("local", modules.clone());
    }
    let mlld = Mlld::new(MlldOptions {
        base_path: Some(base),
        fs: Some(fs),
        resolver: Some(Arc::new(resolver)),
        permissive: cli.permissive,
        ..Default::default()
    });

    let result = match mlld.run(&source, file.as_deref()).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", e);
            let exit = if e.kind.label() == "ParseError" { 2 } else { 1 };
            std::process::exit(exit);
        }
    };

    let rendered = if cli.json {
        let checkpoints: Vec<_> = result
            .checkpoints
            .iter()
            .map(|c| serde_json::json!({"name": c.name, "at": c.at.to_rfc3339()}))
            .collect();
        format!(
            "{}\n",
            serde_json::json!({"output": result.output, "checkpoints": checkpoints})
        )
    } else {
        result.output
    };

    match cli.out {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, rendered) {
                eprintln!("error: cannot write {}: {}", path, e);
                std::process::exit(1);
            }
        }
        None => print!("{}", rendered),
    }
}
