//! # Seed Data Generator
//!
//! Populates the database with test batches for development.
//!
//! ## Usage
//! ```bash
//! # Seed the default database (./pharmacheck.db)
//! cargo run -p pharmacheck-db --bin seed
//!
//! # Specify database path
//! cargo run -p pharmacheck-db --bin seed -- --db ./data/ledger.db
//! ```
//!
//! ## Generated Batches
//! Creates a realistic pharmacy catalogue across categories:
//! - Antibiotics, Analgesics, Antimalarials, Supplements, First Aid
//!
//! Each batch has:
//! - A manufacturer-style batch number: `{CODE}-{YY}{MM}`
//! - Deterministic pseudo-random stock, price and expiry spread by index

use chrono::{Duration, Utc};
use uuid::Uuid;

use pharmacheck_core::Batch;
use pharmacheck_db::{Database, DbConfig};

/// Catalogue: (category, code, name, base price in cents)
const CATALOGUE: &[(&str, &str, &str, i64)] = &[
    ("Antibiotics", "AMX", "Amoxicillin 500mg", 1250),
    ("Antibiotics", "AZI", "Azithromycin 250mg", 1800),
    ("Antibiotics", "CIP", "Ciprofloxacin 500mg", 1500),
    ("Antibiotics", "FLU", "Flucloxacillin 250mg", 950),
    ("Analgesics", "PCM", "Paracetamol 500mg", 400),
    ("Analgesics", "IBU", "Ibuprofen 200mg", 550),
    ("Analgesics", "DIC", "Diclofenac 50mg", 700),
    ("Analgesics", "ASP", "Aspirin 300mg", 350),
    ("Antimalarials", "ALU", "Artemether-Lumefantrine 20/120", 2400),
    ("Antimalarials", "SPD", "Sulfadoxine-Pyrimethamine", 1100),
    ("Antimalarials", "QNN", "Quinine 300mg", 1300),
    ("Supplements", "VTC", "Vitamin C 500mg", 600),
    ("Supplements", "FER", "Ferrous Sulphate 200mg", 450),
    ("Supplements", "ZNC", "Zinc Sulphate 20mg", 500),
    ("Supplements", "MVT", "Multivitamin Syrup 100ml", 1600),
    ("First Aid", "ORS", "ORS Sachet", 150),
    ("First Aid", "PLS", "Adhesive Plasters (20)", 800),
    ("First Aid", "BND", "Crepe Bandage 7.5cm", 950),
    ("First Aid", "ANT", "Antiseptic Solution 100ml", 1200),
    ("First Aid", "GLV", "Examination Gloves (pair)", 200),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse --db argument
    let args: Vec<String> = std::env::args().collect();
    let db_path = args
        .iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or("./pharmacheck.db")
        .to_string();

    println!("PharmaCheck seed");
    println!("  Database: {}", db_path);

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!();
    println!("Generating batches...");

    let mut generated = 0;
    let start = std::time::Instant::now();

    for (idx, (category, code, name, base_price)) in CATALOGUE.iter().enumerate() {
        let batch = generate_batch(category, code, name, *base_price, idx);

        if let Err(e) = db.batches().insert(&batch).await {
            eprintln!("Failed to insert {}: {}", batch.name, e);
            continue;
        }

        generated += 1;
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} batches in {:?}", generated, elapsed);

    let low = db.batches().list_below_safety_stock().await?;
    println!("  Batches at/below safety stock: {}", low.len());
    for batch in &low {
        println!(
            "    {} ({}): {} on hand, threshold {}",
            batch.name, batch.batch_number, batch.quantity, batch.safety_stock
        );
    }

    db.close().await;

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates a single batch with deterministic pseudo-random data.
fn generate_batch(category: &str, code: &str, name: &str, base_price: i64, seed: usize) -> Batch {
    let now = Utc::now();

    // Manufacturer-style batch number from a rolling month
    let month = 1 + (seed % 12) as u32;
    let batch_number = format!("{}-26{:02}", code, month);

    // Stock 0-60, some batches land below the default threshold
    let quantity = ((seed * 13) % 61) as i64;

    // Price varies a little per lot
    let unit_price_cents = base_price + ((seed * 7) % 50) as i64;

    // Expiry spread 3-27 months out
    let expiry_date = (now + Duration::days(90 + ((seed * 37) % 730) as i64)).date_naive();

    Batch {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        batch_number,
        expiry_date,
        quantity,
        unit_price_cents,
        category: Some(category.to_string()),
        safety_stock: 10,
        created_at: now,
        updated_at: now,
    }
}
