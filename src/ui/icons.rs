//! Shared status icons for CLI output.
//!
//! Each icon falls back to plain ASCII on terminals without emoji support.

use console::Emoji;

// Session outcomes
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static STOP: Emoji<'_, '_> = Emoji("⛔ ", "[STOP]");

// Diagnosis
pub static TARGET: Emoji<'_, '_> = Emoji("🎯 ", "->");
pub static SECONDARY: Emoji<'_, '_> = Emoji("↪️  ", "+>");
pub static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static REASONER: Emoji<'_, '_> = Emoji("🧠 ", "[R]");

// Listings
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static STATS: Emoji<'_, '_> = Emoji("📊 ", "[STATS]");
