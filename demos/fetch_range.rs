use anyhow::{Context, Result};
use cddis_fetch::{Archive, Batch, DateSpan, Environment, FileType, RequestTemplate};
use chrono::NaiveDate;

fn main() -> Result<()> {
    // Downloads one week of multi-GNSS navigation files into ./data/2024/.
    // Credentials come from EARTHDATA_USERNAME/EARTHDATA_PASSWORD or ~/.netrc.
    let env = Environment::capture();

    let mut template = RequestTemplate::new(FileType::RinexV3Gnss, "data");
    template.decompress = true;
    template.skip_existing = true;

    let start = NaiveDate::from_ymd_opt(2024, 3, 1).context("invalid start date")?;
    let end = NaiveDate::from_ymd_opt(2024, 3, 7).context("invalid end date")?;
    let summary =
        Batch::http(template, Archive::cddis(), &env)?.run(DateSpan::Range { start, end }, &env);

    println!("{}", summary.to_json()?);
    std::process::exit(summary.exit_code());
}
