use clap::{Arg, ArgAction, Command};
use csv_rows::CsvWriter;
use std::path::PathBuf;

const BATCH: u64 = 10_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("out")
                .long("out")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("with_header")
                .long("with-header")
                .action(ArgAction::SetTrue),
        )
        .arg(Arg::new("cols").long("cols").default_value("3"))
        .arg(Arg::new("delim").long("delim").default_value(","))
        .arg(
            Arg::new("empty_every")
                .long("empty-every")
                .help("Emit a row of blank fields every N rows")
                .value_parser(clap::value_parser!(u64)),
        )
        .get_matches();

    let rows: u64 = matches.get_one::<u64>("rows").copied().unwrap_or_default();
    let out = matches
        .get_one::<PathBuf>("out")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("--out is required"))?;
    let cols: usize = matches
        .get_one::<String>("cols")
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(3);
    let delim = match matches.get_one::<String>("delim").map(|s| s.as_bytes()) {
        Some([byte]) => *byte,
        _ => anyhow::bail!("--delim must be a single byte"),
    };
    let empty_every = matches.get_one::<u64>("empty_every").copied();

    let labels = ["Foo", "Bar", "Baz"];
    let label = |c: usize| match labels.get(c) {
        Some(l) => l.to_string(),
        None => format!("Col{c}"),
    };
    let headers: Vec<String> = (0..cols).map(label).collect();

    // Deterministic data: Foo{i}, Bar{i}, Baz{i}, Col3{i}, ...
    let mut written = 0u64;
    let mut first = true;
    while written < rows || first {
        let end = (written + BATCH).min(rows);
        let batch: Vec<Vec<String>> = (written..end)
            .map(|i| match empty_every {
                Some(n) if n > 0 && i % n == n - 1 => vec![String::new(); cols],
                _ => (0..cols).map(|c| format!("{}{i}", label(c))).collect(),
            })
            .collect();

        let writer = CsvWriter::new(batch).delimiter(delim).to_file(&out);
        if first {
            let writer = if matches.get_flag("with_header") {
                writer.with_headers(headers.clone())
            } else {
                writer
            };
            writer.write().await?;
            first = false;
        } else {
            writer.append().await?;
        }
        written = end;
    }

    eprintln!("wrote {rows} rows to {}", out.display());
    Ok(())
}
