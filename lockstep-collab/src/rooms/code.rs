use rand::seq::SliceRandom;
use rand::thread_rng;

/// Characters used in room codes. Ambiguous glyphs (I, O, 0, 1) are left out
/// so codes survive being read aloud or scribbled down.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of every room code
pub const CODE_LENGTH: usize = 6;

pub fn generate_room_code() -> String {
    let mut rng = thread_rng();

    (0..CODE_LENGTH)
        .map(|_| {
            let byte = CODE_ALPHABET
                .choose(&mut rng)
                .copied()
                .unwrap_or(b'A');
            byte as char
        })
        .collect()
}

/// Normalizes user input into canonical code form, uppercased and trimmed
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}
