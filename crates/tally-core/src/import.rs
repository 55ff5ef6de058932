//! CSV statement import and categorized-table export
//!
//! Bank exports are matched by (case-insensitive) column name rather than
//! position, which covers both the single `Amount` layout and the split
//! `Credit`/`Debit` layout. A file written by [`write_categorized`] is
//! recognized by its `vendor` and `tier` columns and read back with its
//! categorization state intact.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{Reader, ReaderBuilder, StringRecord, WriterBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{Categorization, Classification, Tier, Transaction, UNCATEGORIZED};

/// Row layout of a categorized table
#[derive(Debug, Serialize, Deserialize)]
struct CategorizedRow {
    date: String,
    description: String,
    amount: String,
    category: String,
    vendor: String,
    #[serde(default)]
    tier: String,
    #[serde(default)]
    account_number: String,
    #[serde(default)]
    transaction_type: String,
}

/// Row layout of the rule-miss report
#[derive(Debug, Serialize)]
struct RuleMissRow<'a> {
    date: String,
    description: &'a str,
    amount: String,
}

/// Column positions in a bank export
struct StatementColumns {
    date: usize,
    description: usize,
    amount: AmountColumns,
    bank_category: Option<usize>,
}

enum AmountColumns {
    Single(usize),
    CreditDebit { credit: usize, debit: usize },
}

impl StatementColumns {
    fn resolve(index: &HashMap<String, usize>) -> Result<Self> {
        let find = |names: &[&str]| names.iter().find_map(|n| index.get(*n).copied());

        let date = find(&["transaction date", "date"]).ok_or_else(|| {
            Error::Import("Missing date column (expected 'Transaction Date' or 'Date')".into())
        })?;
        let description = find(&["description", "original description"]).ok_or_else(|| {
            Error::Import(
                "Missing description column (expected 'Description' or 'Original Description')"
                    .into(),
            )
        })?;
        let amount = match (index.get("credit"), index.get("debit")) {
            (Some(&credit), Some(&debit)) => AmountColumns::CreditDebit { credit, debit },
            _ => AmountColumns::Single(find(&["amount"]).ok_or_else(|| {
                Error::Import("Missing amount column (expected 'Amount' or 'Credit'/'Debit')".into())
            })?),
        };

        Ok(Self {
            date,
            description,
            amount,
            bank_category: index.get("category").copied(),
        })
    }
}

/// Lowercased, trimmed header name -> column position (first occurrence wins)
fn header_index(headers: &StringRecord) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (i, name) in headers.iter().enumerate() {
        index.entry(name.trim().to_lowercase()).or_insert(i);
    }
    index
}

fn csv_reader<R: Read>(reader: R) -> Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader)
}

/// Parse a bank statement export into uncategorized transactions
///
/// A previously categorized table (one with `vendor` and `tier` columns) is
/// read back with [`read_categorized`] semantics instead.
pub fn parse_statement<R: Read>(reader: R, account_number: Option<&str>) -> Result<Vec<Transaction>> {
    let mut rdr = csv_reader(reader);
    let headers = rdr.headers()?.clone();
    let index = header_index(&headers);

    if index.contains_key("vendor") && index.contains_key("tier") {
        debug!("Input is a categorized table, keeping existing categories");
        return read_categorized_records(rdr, &headers);
    }

    let columns = StatementColumns::resolve(&index)?;
    let mut transactions = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let line = row + 2;

        let date = parse_date(field(&record, columns.date))
            .map_err(|e| Error::Import(format!("Row {}: {}", line, e)))?;

        let description = field(&record, columns.description).trim().to_string();

        let amount = match columns.amount {
            AmountColumns::Single(i) => parse_amount_lenient(field(&record, i), line),
            AmountColumns::CreditDebit { credit, debit } => {
                parse_amount_lenient(field(&record, credit), line)
                    - parse_amount_lenient(field(&record, debit), line)
            }
        };

        let bank_category = columns
            .bank_category
            .map(|i| field(&record, i).trim().to_string())
            .filter(|s| !s.is_empty());

        let mut tx = Transaction::new(date, description, amount);
        tx.account_number = account_number.map(str::to_string);
        tx.bank_category = bank_category;
        transactions.push(tx);
    }

    debug!(rows = transactions.len(), "Parsed statement");
    Ok(transactions)
}

/// Account identifier from a statement file name
///
/// The second `-`-separated segment of the stem: `quicksilver-8592-jan.csv`
/// gives `8592`.
pub fn account_from_filename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.split('-')
        .nth(1)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read a table written by [`write_categorized`]
pub fn read_categorized<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut rdr = csv_reader(reader);
    let headers = rdr.headers()?.clone();
    read_categorized_records(rdr, &headers)
}

fn read_categorized_records<R: Read>(
    mut rdr: Reader<R>,
    headers: &StringRecord,
) -> Result<Vec<Transaction>> {
    let headers: StringRecord = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let mut transactions = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let line = row + 2;
        let parsed: CategorizedRow = record
            .deserialize(Some(&headers))
            .map_err(|e| Error::Import(format!("Row {}: {}", line, e)))?;

        let date = parse_date(&parsed.date)
            .map_err(|e| Error::Import(format!("Row {}: {}", line, e)))?;
        let amount = parse_amount_lenient(&parsed.amount, line);

        let mut tx = Transaction::new(date, parsed.description.trim(), amount);
        tx.account_number = Some(parsed.account_number.trim().to_string()).filter(|s| !s.is_empty());
        tx.categorization = categorization_from_row(&parsed, line)?;
        transactions.push(tx);
    }

    debug!(rows = transactions.len(), "Read categorized table");
    Ok(transactions)
}

/// Restore the tagged state from the category/vendor/tier columns
///
/// A category edited by hand with no tier is kept as final and marked external.
fn categorization_from_row(row: &CategorizedRow, line: usize) -> Result<Categorization> {
    let category = row.category.trim();
    if category.is_empty() || category.eq_ignore_ascii_case(UNCATEGORIZED) {
        return Ok(Categorization::Uncategorized);
    }

    let tier = match row.tier.trim() {
        "" => Tier::External,
        other => Tier::from_str(other).map_err(|e| Error::Import(format!("Row {}: {}", line, e)))?,
    };

    Ok(Categorization::Categorized(Classification {
        category: category.to_string(),
        vendor: row.vendor.trim().to_string(),
        tier,
    }))
}

/// Write transactions as a categorized table
///
/// Uncategorized rows carry the `uncategorized` sentinel, their default
/// vendor and an empty tier.
pub fn write_categorized<W: Write>(writer: W, transactions: &[Transaction]) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    for tx in transactions {
        wtr.serialize(CategorizedRow {
            date: tx.date.format("%Y-%m-%d").to_string(),
            description: tx.description.clone(),
            amount: tx.amount.to_string(),
            category: tx.category().to_string(),
            vendor: tx.vendor(),
            tier: tx.tier().map(|t| t.as_str().to_string()).unwrap_or_default(),
            account_number: tx.account_number.clone().unwrap_or_default(),
            transaction_type: tx.transaction_type().as_str().to_string(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the `date,description,amount` report of rows no rule recognized
pub fn write_rule_misses<W: Write>(writer: W, rows: &[&Transaction]) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    for tx in rows {
        wtr.serialize(RuleMissRow {
            date: tx.date.format("%Y-%m-%d").to_string(),
            description: &tx.description,
            amount: tx.amount.to_string(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn field(record: &StringRecord, index: usize) -> &str {
    record.get(index).unwrap_or("")
}

/// Parse a date string, trying multiple formats
fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let formats = [
        "%m/%d/%Y", // 01/15/2024
        "%m/%d/%y", // 01/15/24
        "%Y-%m-%d", // 2024-01-15
        "%m-%d-%Y", // 01-15-2024
        "%d/%m/%Y", // 15/01/2024 (European)
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(Error::Import(format!("Unable to parse date: {}", s)))
}

/// Parse an amount string, handling currency symbols, commas and parentheses
fn parse_amount(s: &str) -> Result<Decimal> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    Decimal::from_str(&cleaned).map_err(|_| Error::Import(format!("Unable to parse amount: {}", s)))
}

/// Blank amounts are zero; unparseable ones are zero with a warning
fn parse_amount_lenient(s: &str, line: usize) -> Decimal {
    if s.trim().is_empty() {
        return Decimal::ZERO;
    }
    parse_amount(s).unwrap_or_else(|e| {
        warn!(row = line, error = %e, "Treating unparseable amount as 0");
        Decimal::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("01/15/2024").unwrap(), date(2024, 1, 15));
        assert_eq!(parse_date("2024-01-15").unwrap(), date(2024, 1, 15));
        assert_eq!(parse_date("01-15-2024").unwrap(), date(2024, 1, 15));
        assert_eq!(parse_date("25/12/2024").unwrap(), date(2024, 12, 25));
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.56").unwrap(), Decimal::new(123456, 2));
        assert_eq!(parse_amount("(45.00)").unwrap(), Decimal::new(-4500, 2));
        assert_eq!(parse_amount("-3.5").unwrap(), Decimal::new(-35, 1));
        assert!(parse_amount("n/a").is_err());
        assert_eq!(parse_amount_lenient("n/a", 2), Decimal::ZERO);
        assert_eq!(parse_amount_lenient("  ", 2), Decimal::ZERO);
    }

    #[test]
    fn test_parse_credit_debit_layout() {
        let csv = "Transaction Date,Posted Date,Card No.,Description,Category,Debit,Credit\n\
                   2025-01-03,2025-01-04,8592,STARBUCKS STORE 1234 ,Dining,4.75,\n\
                   2025-01-05,2025-01-06,8592,CAPITAL ONE AUTOPAY,Payment/Credit,,250.00\n";
        let txs = parse_statement(csv.as_bytes(), Some("8592")).unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].date, date(2025, 1, 3));
        assert_eq!(txs[0].description, "STARBUCKS STORE 1234");
        assert_eq!(txs[0].amount, Decimal::new(-475, 2));
        assert_eq!(txs[0].bank_category.as_deref(), Some("Dining"));
        assert_eq!(txs[0].account_number.as_deref(), Some("8592"));
        assert!(txs[0].categorization.is_uncategorized());

        assert_eq!(txs[1].amount, Decimal::new(25000, 2));
        assert_eq!(txs[1].transaction_type().as_str(), "payment");
    }

    #[test]
    fn test_parse_single_amount_layout() {
        let csv = "Date,Description,Original Description,Category,Amount,Status\n\
                   01/10/2025,Netflix,NETFLIX.COM 866-579,Entertainment,-15.49,Posted\n\
                   01/11/2025,Paycheck,ACME PAYROLL,Income,\"2,500.00\",Posted\n\
                   01/12/2025,Broken,BROKEN AMT,,oops,Posted\n";
        let txs = parse_statement(csv.as_bytes(), None).unwrap();

        assert_eq!(txs.len(), 3);
        // `description` wins over `original description`
        assert_eq!(txs[0].description, "Netflix");
        assert_eq!(txs[0].amount, Decimal::new(-1549, 2));
        assert_eq!(txs[1].amount, Decimal::new(250000, 2));
        assert_eq!(txs[2].amount, Decimal::ZERO);
        assert_eq!(txs[2].bank_category, None);
        assert_eq!(txs[2].account_number, None);
    }

    #[test]
    fn test_parse_original_description_fallback() {
        let csv = "date,original description,amount\n2025-02-01,SHELL OIL 5741,-40.10\n";
        let txs = parse_statement(csv.as_bytes(), None).unwrap();
        assert_eq!(txs[0].description, "SHELL OIL 5741");
    }

    #[test]
    fn test_parse_missing_columns() {
        let err = parse_statement("Date,Amount\n2025-01-01,5\n".as_bytes(), None).unwrap_err();
        assert!(matches!(err, Error::Import(_)));

        let err = parse_statement("Date,Description\n2025-01-01,X\n".as_bytes(), None).unwrap_err();
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_parse_bad_date_is_fatal() {
        let csv = "Date,Description,Amount\nnot-a-date,X,1.00\n";
        let err = parse_statement(csv.as_bytes(), None).unwrap_err();
        assert!(err.to_string().contains("Row 2"));
    }

    #[test]
    fn test_account_from_filename() {
        assert_eq!(
            account_from_filename(Path::new("data/raw/quicksilver-8592-jan-apr-2025.csv")),
            Some("8592".to_string())
        );
        assert_eq!(
            account_from_filename(Path::new("usaa-checking-8087.csv")),
            Some("checking".to_string())
        );
        assert_eq!(account_from_filename(Path::new("statement.csv")), None);
    }

    #[test]
    fn test_categorized_table_restores_state() {
        let mut done = Transaction::new(date(2025, 1, 3), "AMAZON.COM", Decimal::new(-2999, 2));
        done.account_number = Some("8592".into());
        done.categorization = Categorization::Categorized(Classification {
            category: "shopping".into(),
            vendor: "AMAZON.COM".into(),
            tier: Tier::Exact,
        });
        let open = Transaction::new(date(2025, 1, 4), "XKCD-1234-5678-9012", Decimal::new(-100, 2));

        let mut buf = Vec::new();
        write_categorized(&mut buf, &[done.clone(), open.clone()]).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with(
            "date,description,amount,category,vendor,tier,account_number,transaction_type\n"
        ));
        assert!(text.contains("2025-01-04,XKCD-1234-5678-9012,-1.00,uncategorized,XKCD-1234-5678-9012,,,expense"));

        let back = parse_statement(buf.as_slice(), Some("ignored")).unwrap();
        assert_eq!(back, vec![done, open]);
    }

    #[test]
    fn test_categorized_manual_category_without_tier() {
        let csv = "date,description,amount,category,vendor,tier\n\
                   2025-01-03,CORNER STORE,-3.00,Groceries,CORNER STORE,\n";
        let txs = read_categorized(csv.as_bytes()).unwrap();
        assert_eq!(txs[0].category(), "Groceries");
        assert_eq!(txs[0].tier(), Some(Tier::External));
    }

    #[test]
    fn test_categorized_unknown_tier_is_error() {
        let csv = "date,description,amount,category,vendor,tier\n\
                   2025-01-03,X,-3.00,Groceries,X,psychic\n";
        assert!(matches!(read_categorized(csv.as_bytes()), Err(Error::Import(_))));
    }

    #[test]
    fn test_write_rule_misses() {
        let tx = Transaction::new(date(2025, 3, 9), "MYSTERY, INC", Decimal::new(-1250, 2));
        let mut buf = Vec::new();
        write_rule_misses(&mut buf, &[&tx]).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "date,description,amount\n2025-03-09,\"MYSTERY, INC\",-12.50\n"
        );
    }
}
