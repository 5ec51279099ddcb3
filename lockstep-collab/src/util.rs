use chrono::Utc;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// Milliseconds since the unix epoch, as sampled by the server clock
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
