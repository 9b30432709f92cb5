use csv_rows::{Csv, CsvError, CsvObject, CsvWriter, Record, Row};
use std::path::Path;

#[cfg(windows)]
const NL: &str = "\r\n";
#[cfg(not(windows))]
const NL: &str = "\n";

fn lines(items: &[&str]) -> String {
    items.iter().map(|l| format!("{l}{NL}")).collect()
}

fn read(path: &Path) -> anyhow::Result<String> {
    Ok(std::fs::read_to_string(path)?)
}

fn record(pairs: &[(&str, &str)]) -> Record {
    pairs.iter().copied().collect()
}

#[tokio::test]
async fn writes_rows() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");

    Csv::make(vec![vec!["Foo", "Bar", "Baz"]])
        .to_file(&path)
        .write()
        .await?;
    assert_eq!(read(&path)?, lines(&["Foo,Bar,Baz"]));
    Ok(())
}

#[tokio::test]
async fn writes_header_line_first() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");

    Csv::make(vec![vec!["Foo", "Bar", "Baz"]])
        .with_headers(["Col1", "Col2", "Col3"])
        .to_file(&path)
        .write()
        .await?;
    assert_eq!(read(&path)?, lines(&["Col1,Col2,Col3", "Foo,Bar,Baz"]));
    Ok(())
}

#[tokio::test]
async fn realigns_keyed_rows_to_headers() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");

    Csv::make(vec![record(&[("Col2", "Bar"), ("Col1", "Foo"), ("Col3", "Baz")])])
        .with_headers(["Col1", "Col2", "Col3"])
        .to_file(&path)
        .write()
        .await?;
    assert_eq!(read(&path)?, lines(&["Col1,Col2,Col3", "Foo,Bar,Baz"]));
    Ok(())
}

#[tokio::test]
async fn appends_below_existing_header() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");

    Csv::make(vec![vec!["Foo", "Bar", "Baz"]])
        .with_headers(["Col1", "Col2", "Col3"])
        .to_file(&path)
        .write()
        .await?;
    Csv::make(vec![vec!["Foo", "Bar", "Baz"]])
        .to_file(&path)
        .append()
        .await?;

    assert_eq!(
        read(&path)?,
        lines(&["Col1,Col2,Col3", "Foo,Bar,Baz", "Foo,Bar,Baz"])
    );
    Ok(())
}

#[tokio::test]
async fn appends_keyed_rows_in_file_header_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");

    Csv::make(vec![record(&[("Col2", "Bar"), ("Col1", "Foo"), ("Col3", "Baz")])])
        .with_headers(["Col1", "Col2", "Col3"])
        .to_file(&path)
        .write()
        .await?;
    // No headers given: the order comes from the file's first line.
    Csv::make(vec![record(&[("Col3", "Baz2"), ("Col2", "Bar2"), ("Col1", "Foo2")])])
        .to_file(&path)
        .append()
        .await?;

    assert_eq!(
        read(&path)?,
        lines(&["Col1,Col2,Col3", "Foo,Bar,Baz", "Foo2,Bar2,Baz2"])
    );
    Ok(())
}

#[tokio::test]
async fn inserts_at_the_start() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");
    std::fs::write(&path, "A,B,C\nD,E,F\n")?;

    CsvWriter::new(Vec::<Row>::new())
        .to_file(&path)
        .insert_row(1, &["X".into(), "Y".into(), "Z".into()])
        .await?;
    assert_eq!(read(&path)?, format!("X,Y,Z{NL}A,B,C\nD,E,F\n"));

    CsvWriter::new(Vec::<Row>::new())
        .to_file(&path)
        .insert_row(0, &["0".into()])
        .await?;
    assert!(read(&path)?.starts_with(&format!("0{NL}X,Y,Z")));
    Ok(())
}

#[tokio::test]
async fn inserts_in_the_middle_and_past_the_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");
    std::fs::write(&path, "A,B\nC,D")?;

    let writer = CsvWriter::new(Vec::<Row>::new()).to_file(&path);
    writer.insert_row(2, &["M".into(), "N".into()]).await?;
    assert_eq!(read(&path)?, format!("A,B\nM,N{NL}C,D"));

    // The unterminated last line gets a terminator before the inserted row.
    writer.insert_row(10, &["Y".into(), "Z".into()]).await?;
    assert_eq!(read(&path)?, format!("A,B\nM,N{NL}C,D{NL}Y,Z{NL}"));
    Ok(())
}

#[tokio::test]
async fn appends_after_an_unterminated_last_line() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");
    std::fs::write(&path, "Col1,Col2\nA,B")?;

    CsvWriter::new(vec![Row::from(["C", "D"])])
        .to_file(&path)
        .append()
        .await?;
    assert_eq!(read(&path)?, format!("Col1,Col2\nA,B{NL}C,D{NL}"));

    let rows = Csv::read(&path).map_to_headers().count().await?;
    assert_eq!(rows, 2);
    Ok(())
}

#[tokio::test]
async fn reader_insert_skips_header_row() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");
    std::fs::write(&path, "Col1,Col2\nA,B\n")?;

    let csv = Csv::read(&path).map_to_headers();
    csv.insert_at(1, ["X", "Y"]).await?;
    assert_eq!(read(&path)?, format!("Col1,Col2\nX,Y{NL}A,B\n"));

    let first = csv.first().await?.unwrap();
    assert_eq!(first.get("Col1"), Some("X"));
    Ok(())
}

#[tokio::test]
async fn reader_appends_to_its_source() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");
    std::fs::write(&path, "Col1,Col2\nA,B\n")?;

    let csv = Csv::read(&path).map_to_headers();
    csv.append(vec![record(&[("Col2", "D"), ("Col1", "C")])]).await?;
    assert_eq!(csv.count().await?, 2);
    assert_eq!(read(&path)?, format!("Col1,Col2\nA,B\nC,D{NL}"));
    Ok(())
}

#[tokio::test]
async fn plain_rows_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");
    let rows = vec![
        vec!["plain", "with,comma", "with \"quotes\""],
        vec!["multi\nline", "", "tail"],
        vec!["short", "row", ""],
    ];

    Csv::make(rows.clone())
        .delimiter(b';')
        .to_file(&path)
        .write()
        .await?;
    let back = Csv::read(&path).delimiter(b';').to_vec().await?;

    let expected: Vec<Row> = rows.into_iter().map(Row::from).collect();
    assert_eq!(back, expected);
    Ok(())
}

#[derive(Debug, Default, serde::Serialize)]
struct Item {
    sku: String,
    qty: u32,
}

impl CsvObject for Item {
    fn set_attribute(&mut self, name: &str, value: &str) -> bool {
        match name {
            "sku" => self.sku = value.to_string(),
            "qty" => self.qty = value.parse().unwrap_or_default(),
            _ => return false,
        }
        true
    }

    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

#[tokio::test]
async fn object_rows_write_back() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("in.csv");
    let target = dir.path().join("out.csv");
    std::fs::write(&source, "qty,sku\n3,A-1\n")?;

    let rows = Csv::read(&source).map_to_object_of::<Item>().to_vec().await?;
    Csv::make(rows)
        .with_headers(["sku", "qty"])
        .to_file(&target)
        .write()
        .await?;
    assert_eq!(read(&target)?, lines(&["sku,qty", "A-1,3"]));
    Ok(())
}

#[tokio::test]
async fn unwritable_targets_fail() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("missing").join("out.csv");

    let err = Csv::make(vec![vec!["a"]]).to_file(&path).write().await.unwrap_err();
    assert!(matches!(err, CsvError::OpenTarget { .. }));

    let err = CsvWriter::new(Vec::<Row>::new())
        .to_file(&path)
        .insert_row(1, &["a".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, CsvError::OpenTarget { .. }));

    let err = Csv::read("https://example.com/data.csv")
        .insert_at(1, ["a"])
        .await
        .unwrap_err();
    assert!(matches!(err, CsvError::ReadOnlySource(_)));
    Ok(())
}
