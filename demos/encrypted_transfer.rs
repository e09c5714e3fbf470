//! Encrypted transfer walkthrough
//!
//! This demo shows:
//! - Creating a PIN-protected file key
//! - Unlocking it on a second device from the server copy
//! - A small upload (single sealed object)
//! - A large upload (multipart, one sealed part per chunk)
//! - Ranged download and decryption
//!
//! It runs against the in-memory backend, so no server is needed.
//! Point `GhostClient::new` at a real endpoint to talk to a live backend.
//!
//! Run with: cargo run --example encrypted_transfer

use bytes::Bytes;
use ghost_client::{Config, GhostClient, MemoryBackend, TransferOptions};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ghost_client=info".into()),
        )
        .init();

    println!("🔐 Ghost Drive - Encrypted Transfer Demo\n");

    let backend = Arc::new(MemoryBackend::new());

    // Small chunks keep the demo fast while still exercising multipart
    let config = Config::default().with_chunking(1024 * 1024, 1024 * 1024);

    // ==================== PIN Setup ====================

    println!("🔑 Creating file key under PIN...");
    let laptop = GhostClient::with_backend(config.clone(), backend.clone(), backend.clone());
    let user = laptop.create_pin("482913").await?;
    if let Some(wrapped) = &user.encrypted_key {
        println!("   Stored wrapped key: {}...", &wrapped.as_str()[..16]);
    }

    // ==================== Small File ====================

    println!("\n📤 Uploading a small note...");
    let note = Bytes::from_static(b"meet at the usual place, 7pm");
    let outcome = laptop.upload_bytes("notes/today.txt", note.clone()).await?;
    println!(
        "   ✅ {} bytes stored as {} bytes ({})",
        outcome.plaintext_size,
        outcome.encrypted_size,
        if outcome.multipart { "multipart" } else { "single object" }
    );

    // ==================== Large File ====================

    println!("\n📤 Uploading a 5.5 MiB file...");
    let large: Bytes = (0..5 * 1024 * 1024 + 512 * 1024)
        .map(|i: u32| (i % 256) as u8)
        .collect::<Vec<u8>>()
        .into();
    let options = TransferOptions::default().with_progress(Box::new(|p| {
        println!("   ... {}/{} parts ({:.0}%)", p.completed, p.total, p.percentage());
    }));
    let outcome = laptop.upload("videos/clip.mp4", &large, options).await?;
    println!(
        "   ✅ {} parts, {} bytes stored",
        outcome.parts.len(),
        outcome.encrypted_size
    );

    // ==================== Second Device ====================

    println!("\n📱 Unlocking on a second device...");
    let phone = GhostClient::with_backend(config, backend.clone(), backend.clone());
    match phone.unlock_from_server("000000").await {
        Ok(()) => println!("   ⚠️  wrong PIN was accepted"),
        Err(e) => println!("   ❌ {}", e.user_message()),
    }
    phone.unlock_from_server("482913").await?;
    println!("   ✅ Unlocked");

    // ==================== Download ====================

    println!("\n📥 Downloading...");
    let back = phone
        .download("notes/today.txt", note.len() as u64, TransferOptions::default())
        .await?;
    println!("   note: {}", String::from_utf8_lossy(&back));

    let back = phone
        .download("videos/clip.mp4", large.len() as u64, TransferOptions::default())
        .await?;
    println!(
        "   clip: {} bytes, matches original: {}",
        back.len(),
        back == large
    );
    println!("   ranged GETs issued: {}", backend.range_gets());

    phone.lock();
    println!("\n🔒 Key forgotten. Done.");
    Ok(())
}
