//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `scheduler_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("scheduler_core version={}", scheduler_core::core_version());
    match scheduler_core::db::open_db_in_memory() {
        Ok(_) => println!("scheduler_core storage=ok"),
        Err(err) => println!("scheduler_core storage=error {err}"),
    }
}
