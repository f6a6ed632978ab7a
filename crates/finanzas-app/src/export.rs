// CSV export of the loaded transactions.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

use finanzas_core::model::Transaction;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    fecha: String,
    tipo: &'a str,
    categoria: &'a str,
    descripcion: &'a str,
    monto: f64,
}

/// `finanzas-transacciones-2026-10-19.csv` inside `dir`.
pub fn export_path(dir: &Path, today: NaiveDate) -> PathBuf {
    dir.join(format!("finanzas-transacciones-{today}.csv"))
}

/// Write one row per transaction, in the order given. Returns the row count.
pub fn write_csv(path: &Path, transactions: &[Transaction]) -> anyhow::Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    for tx in transactions {
        writer.serialize(CsvRow {
            fecha: tx
                .effective_date()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            tipo: tx.kind.label(),
            categoria: &tx.category,
            descripcion: tx.description.as_deref().unwrap_or(""),
            monto: tx.amount,
        })?;
    }
    writer.flush().context("flushing csv")?;
    Ok(transactions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use finanzas_core::model::TransactionKind;

    #[test]
    fn writes_header_and_rows() {
        let dir = std::env::temp_dir().join(format!("finanzas_export_{}", std::process::id()));
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let path = export_path(&dir, today);
        assert!(path.ends_with("finanzas-transacciones-2026-10-19.csv"));

        let tx = Transaction {
            id: "1".into(),
            user_id: None,
            kind: TransactionKind::Expense,
            amount: 4500.0,
            category: "Transporte".into(),
            description: Some("Metro, tarjeta".into()),
            date: Some(today),
            created_at: None,
        };
        assert_eq!(write_csv(&path, &[tx]).unwrap(), 1);

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("fecha,tipo,categoria,descripcion,monto"));
        assert_eq!(lines.next(), Some("2026-10-19,Gasto,Transporte,\"Metro, tarjeta\",4500.0"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
