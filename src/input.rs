//! Loading the input sheet of items and price bands

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::error::InputError;
use crate::models::InputItem;

pub const NAME_COLUMN: &str = "Item Name";
pub const MIN_PRICE_COLUMN: &str = "Min Cost ($)";
pub const MAX_PRICE_COLUMN: &str = "Max Cost ($)";

const REQUIRED_COLUMNS: [&str; 3] = [NAME_COLUMN, MIN_PRICE_COLUMN, MAX_PRICE_COLUMN];

/// Reads the input CSV at `path`.
///
/// # Errors
///
/// Missing file, unreadable CSV or missing required columns. Bad rows are
/// logged and repaired or skipped rather than failing the load.
pub fn load_input_items(path: &Path) -> Result<Vec<InputItem>, InputError> {
    if !path.exists() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }

    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| InputError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    read_items(reader).map_err(|err| match err {
        InputError::Csv { source, .. } => InputError::Csv {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Same as [`load_input_items`] over any reader, for in-memory input.
pub fn parse_input_items<R: Read>(input: R) -> Result<Vec<InputItem>, InputError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);
    read_items(reader)
}

fn read_items<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<InputItem>, InputError> {
    let headers = reader
        .headers()
        .map_err(|source| InputError::Csv {
            path: Default::default(),
            source,
        })?
        .clone();

    if headers.is_empty() {
        return Err(InputError::MissingHeaders);
    }

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .map(|col| (*col).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(InputError::MissingColumns(missing));
    }

    let mut items = Vec::new();
    let mut rows = 0usize;
    let mut problems = 0usize;

    // Row 1 is the header
    for (row_num, record) in reader.records().enumerate().map(|(i, r)| (i + 2, r)) {
        rows += 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Row {row_num}: unreadable record, skipping: {e}");
                problems += 1;
                continue;
            }
        };

        let field = |column: &str| {
            headers
                .iter()
                .position(|h| h == column)
                .and_then(|idx| record.get(idx))
                .unwrap_or("")
        };

        let name = field(NAME_COLUMN);
        if name.is_empty() {
            warn!("Row {row_num}: missing item name, skipping");
            problems += 1;
            continue;
        }

        let mut price = |column: &str, label: &str| match field(column).parse::<f64>() {
            Ok(p) if p.is_finite() => p,
            _ => {
                warn!("Row {row_num}: invalid {label} price for '{name}', using 0");
                problems += 1;
                0.0
            }
        };
        let mut min_price = price(MIN_PRICE_COLUMN, "min");
        let mut max_price = price(MAX_PRICE_COLUMN, "max");

        if min_price > max_price {
            warn!(
                "Row {row_num}: min price ({min_price}) > max price ({max_price}) for '{name}', swapping"
            );
            std::mem::swap(&mut min_price, &mut max_price);
            problems += 1;
        }

        let extra: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, value)| !REQUIRED_COLUMNS.contains(header) && !value.is_empty())
            .map(|(header, value)| (normalize_column(header), value.to_string()))
            .collect();

        items.push(InputItem {
            name: name.to_string(),
            min_price,
            max_price,
            extra,
        });
    }

    info!(
        "Processed {rows} rows with {problems} problems, loaded {} items",
        items.len()
    );
    Ok(items)
}

/// `"Store ID"` -> `"store_id"`
fn normalize_column(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}
