//! Synthetic transaction data for benchmark runs

use std::path::Path;

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::{BenchError, Result};
use crate::loader::Manifest;
use crate::types::Payload;

const TRANSACTION_TYPES: &[&str] = &["PURCHASE", "REFUND", "ADJUSTMENT", "PAYMENT", "TRANSFER"];
const STATUSES: &[&str] = &["COMPLETED", "PENDING", "FAILED", "CANCELLED"];
const CURRENCIES: &[&str] = &["USD", "EUR", "GBP", "JPY", "CAD"];
const PAYMENT_METHODS: &[&str] = &["CREDIT_CARD", "DEBIT_CARD", "PAYPAL", "BANK_TRANSFER"];
const MERCHANTS: &[&str] = &[
    "Etsy",
    "Patreon",
    "Skillshare",
    "Masterclass",
    "Udemy",
    "Khan Academy",
    "Codecademy",
    "Duolingo",
    "Coursera",
    "edX",
];

/// Produces random but realistic-looking transactions
pub struct TransactionGenerator<R: Rng> {
    rng: R,
    now: NaiveDateTime,
}

impl TransactionGenerator<rand::rngs::ThreadRng> {
    pub fn new() -> Self {
        Self::with_rng(rand::thread_rng())
    }
}

impl Default for TransactionGenerator<rand::rngs::ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> TransactionGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            now: Local::now().naive_local(),
        }
    }

    fn pick(&mut self, choices: &[&str]) -> String {
        choices.choose(&mut self.rng).copied().unwrap_or_default().to_string()
    }

    /// Generate one transaction dated somewhere in the past year
    pub fn transaction(&mut self) -> Payload {
        let kind = self.pick(TRANSACTION_TYPES);
        let mut amount = round2(self.rng.gen_range(1.0..1000.0));
        match kind.as_str() {
            "REFUND" => amount = -amount,
            "ADJUSTMENT" => amount = round2(self.rng.gen_range(-100.0..100.0)),
            _ => {}
        }

        let age = ChronoDuration::days(self.rng.gen_range(0..=365))
            + ChronoDuration::hours(self.rng.gen_range(0..=23))
            + ChronoDuration::minutes(self.rng.gen_range(0..=59))
            + ChronoDuration::seconds(self.rng.gen_range(0..=59))
            + ChronoDuration::microseconds(self.rng.gen_range(0..=999_999));
        let timestamp = self.now - age;

        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::from(kind));
        fields.insert("amount".to_string(), json!(amount));
        fields.insert("currency".to_string(), Value::from(self.pick(CURRENCIES)));
        fields.insert("status".to_string(), Value::from(self.pick(STATUSES)));
        fields.insert("merchant".to_string(), Value::from(self.pick(MERCHANTS)));
        fields.insert("customerId".to_string(), Value::from(Uuid::new_v4().to_string()));
        fields.insert("paymentMethod".to_string(), Value::from(self.pick(PAYMENT_METHODS)));
        fields.insert(
            "metadata".to_string(),
            json!({
                "location": format!(
                    "{},{}",
                    self.rng.gen_range(-90..=90),
                    self.rng.gen_range(-180..=180)
                ),
                "deviceId": Uuid::new_v4().to_string(),
                "ipAddress": format!(
                    "{}.{}.{}.{}",
                    self.rng.gen_range(1..=255),
                    self.rng.gen_range(1..=255),
                    self.rng.gen_range(1..=255),
                    self.rng.gen_range(1..=255)
                ),
            }),
        );

        Payload::new(Uuid::new_v4().to_string(), timestamp, fields)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Write `count` transactions as `transactions_batch_<n>.json` files of at most
/// `batch_size` entries, plus a manifest listing them in order.
pub fn generate(output_dir: &Path, count: u64, batch_size: u64) -> Result<Manifest> {
    if count == 0 || batch_size == 0 {
        return Err(BenchError::Config(
            "count and batch size must be greater than zero".to_string(),
        ));
    }

    std::fs::create_dir_all(output_dir)?;
    let mut generator = TransactionGenerator::new();
    let total_batches = count.div_ceil(batch_size);
    let mut files = Vec::new();
    let mut written = 0u64;

    info!(
        "Generating {} transactions in {} batches into {}",
        count,
        total_batches,
        output_dir.display()
    );

    for batch_num in 1..=total_batches {
        let size = batch_size.min(count - written);
        let batch: Vec<Payload> = (0..size).map(|_| generator.transaction()).collect();
        written += size;

        let name = format!("transactions_batch_{}.json", batch_num);
        std::fs::write(output_dir.join(&name), serde_json::to_string_pretty(&batch)?)?;
        files.push(name);

        info!(
            "Progress: {:.1}% - generated batch {}/{}",
            written as f64 / count as f64 * 100.0,
            batch_num,
            total_batches
        );
    }

    let manifest = Manifest {
        total_transactions: count,
        total_batches,
        batch_size,
        generated_at: Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        files,
    };
    manifest.save(output_dir)?;

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_all;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    #[test]
    fn test_transaction_shape() {
        let mut generator = TransactionGenerator::with_rng(StdRng::seed_from_u64(7));
        for _ in 0..50 {
            let tx = generator.transaction();
            let fields = tx.fields();
            let kind = fields["type"].as_str().unwrap();
            let amount = fields["amount"].as_f64().unwrap();
            match kind {
                "REFUND" => assert!(amount <= -1.0),
                "ADJUSTMENT" => assert!((-100.0..=100.0).contains(&amount)),
                _ => assert!((1.0..=1000.0).contains(&amount)),
            }
            assert!(fields["metadata"]["deviceId"].is_string());
            assert!(tx.timestamp() <= Local::now().naive_local());
        }
    }

    #[test]
    fn test_generate_round_trips_through_loader() {
        let dir = tempdir().unwrap();
        let manifest = generate(dir.path(), 25, 10).unwrap();

        assert_eq!(manifest.total_batches, 3);
        assert_eq!(
            manifest.files,
            vec![
                "transactions_batch_1.json",
                "transactions_batch_2.json",
                "transactions_batch_3.json"
            ]
        );

        let batches = load_all(dir.path()).unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn test_generate_rejects_zero_batch_size() {
        let dir = tempdir().unwrap();
        assert!(matches!(generate(dir.path(), 10, 0), Err(BenchError::Config(_))));
    }

    #[test]
    fn test_huge_count_fails_on_first_write() {
        let dir = tempdir().unwrap();
        // A directory where the first batch file should go
        std::fs::create_dir(dir.path().join("transactions_batch_1.json")).unwrap();

        let err = generate(dir.path(), u64::MAX, 1).unwrap_err();
        assert!(matches!(err, BenchError::Io(_)));
        assert!(!dir.path().join("manifest.json").exists());
    }
}
