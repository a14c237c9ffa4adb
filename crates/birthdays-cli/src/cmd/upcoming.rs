use anyhow::Result;
use birthdays_core::calendar::{self, ViewQuery};
use birthdays_core::config::Config;
use birthdays_core::store::{CsvFileStore, RecordStore};

use crate::output::{print_json, print_table};

pub fn run(
    config: &Config,
    period: Option<&str>,
    modulo: Option<&str>,
    sort: Option<&str>,
    json: bool,
) -> Result<()> {
    let query = ViewQuery::parse(period, modulo, sort)?;
    let rows = CsvFileStore::new(config.data_path.clone()).load()?;
    let today = chrono::Local::now().date_naive();
    let view = calendar::view(&rows, &query, today);

    if json {
        return print_json(&view);
    }

    if view.is_empty() {
        println!("No birthdays in period '{}'.", query.period);
        return Ok(());
    }

    let table: Vec<Vec<String>> = view
        .iter()
        .map(|row| {
            let r = &row.record;
            vec![
                row.index.to_string(),
                r.full_name(),
                format!("{}.{}.{}", r.day, r.month, r.year),
                row.age.to_string(),
                row.next_birthday.clone(),
            ]
        })
        .collect();
    print_table(&["#", "NAME", "DATE", "AGE", "NEXT BIRTHDAY"], &table);
    Ok(())
}
