use clap::{Arg, ArgAction, Command};
use crc32fast::Hasher as Crc32;
use csv_rows::{Column, Csv, ReadOptions, Row};
use futures::TryStreamExt;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("csv_rows=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = Command::new("bench")
        .arg(Arg::new("source").long("source").help("Local path or http(s) URL").required(true))
        .arg(Arg::new("options").long("options").help("JSON file with read options; flags below override it").value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("delim").long("delim").help("Single-byte delimiter"))
        .arg(Arg::new("headers").long("headers").help("Map rows to the labels on this row").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("skip-row").long("skip-row").action(ArgAction::Append).value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("skip-column").long("skip-column").help("1-based index or header name").action(ArgAction::Append))
        .arg(Arg::new("skip-empty").long("skip-empty").action(ArgAction::SetTrue))
        .arg(Arg::new("objects").long("objects").help("Materialize generic objects").action(ArgAction::SetTrue))
        .arg(Arg::new("verify").long("verify").help("CRC32 over every emitted field").action(ArgAction::SetTrue))
        .arg(Arg::new("limit").long("limit").help("Stop after N rows").value_parser(clap::value_parser!(u64)))
        .arg(Arg::new("json").long("json").help("Print the rows as JSON instead of stats").action(ArgAction::SetTrue))
        .get_matches();

    let source = matches.get_one::<String>("source").cloned().unwrap_or_default();
    let mut options = match matches.get_one::<PathBuf>("options") {
        Some(path) => serde_json::from_slice::<ReadOptions>(&std::fs::read(path)?)?,
        None => ReadOptions::default(),
    };
    if let Some(delim) = matches.get_one::<String>("delim") {
        let [byte] = delim.as_bytes() else {
            anyhow::bail!("delimiter must be a single byte, got {delim:?}");
        };
        options.delimiter = *byte;
    }
    if let Some(&row) = matches.get_one::<usize>("headers") {
        options.map_to_headers = true;
        options.header_row = row;
    }
    if let Some(rows) = matches.get_many::<usize>("skip-row") {
        options.skip_rows.extend(rows.copied());
    }
    if let Some(columns) = matches.get_many::<String>("skip-column") {
        options.skip_columns.extend(columns.map(|c| match c.parse::<usize>() {
            Ok(index) => Column::Index(index),
            Err(_) => Column::Name(c.clone()),
        }));
    }
    options.skip_empty_rows |= matches.get_flag("skip-empty");
    if matches.get_flag("objects") {
        options.map_to_headers = true;
        options.map_to_object = true;
    }

    let csv = Csv::read(source.as_str()).with_options(options);

    if matches.get_flag("json") {
        println!("{}", csv.to_json().await?);
        return Ok(());
    }

    let start = Instant::now();
    let limit = matches.get_one::<u64>("limit").copied();
    let verify = matches.get_flag("verify");

    let mut rows = csv.stream();
    let mut row_count: u64 = 0;
    let mut crc = Crc32::new();
    while let Some(row) = rows.try_next().await? {
        row_count += 1;
        if verify {
            // Fields separated by '\x1f' (unit separator), rows by '\x1e'.
            for (fi, field) in row_values(&row).into_iter().enumerate() {
                if fi > 0 {
                    crc.update(&[0x1f]);
                }
                crc.update(field.as_bytes());
            }
            crc.update(&[0x1e]);
        }
        if limit.is_some_and(|lim| row_count >= lim) {
            break;
        }
    }
    drop(rows);

    let elapsed = start.elapsed().as_secs_f64();
    let rps = (row_count as f64) / elapsed;
    let headers = if csv.options().map_to_headers {
        csv.header_row().await?
    } else {
        Vec::new()
    };
    if verify {
        println!(
            "source={} rows={} headers={:?} crc=0x{:08x}\nelapsed={:.1}s rows/sec={:.0}",
            csv.source(),
            row_count,
            headers,
            crc.finalize(),
            elapsed,
            rps
        );
    } else {
        println!(
            "source={} rows={} headers={:?}\nelapsed={:.1}s rows/sec={:.0}",
            csv.source(),
            row_count,
            headers,
            elapsed,
            rps
        );
    }
    Ok(())
}

fn row_values(row: &Row) -> Vec<String> {
    match row {
        Row::Fields(fields) => fields.clone(),
        Row::Record(record) => record.values().map(str::to_string).collect(),
        Row::Object(_) => match serde_json::to_value(row) {
            Ok(serde_json::Value::Object(map)) => map.values().map(|v| v.to_string()).collect(),
            _ => Vec::new(),
        },
    }
}
