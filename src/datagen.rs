//! Pseudo-random data generators for the synthetic schemas

use rand::distributions::Alphanumeric;
use rand::Rng;

/// TPC-C last-name syllable table.
pub const LAST_NAME_SYLLABLES: [&str; 10] = [
    "BAR", "OUGHT", "ABLE", "PRI", "PRES", "ESE", "ANTI", "CALLY", "ATION", "EING",
];

/// Random alphanumeric string with length drawn uniformly in `[min, max]`.
pub fn rand_string(rng: &mut impl Rng, min: usize, max: usize) -> String {
    let len = if min >= max { min } else { rng.gen_range(min..=max) };
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Fixed-length random alphanumeric string.
pub fn rand_string_exact(rng: &mut impl Rng, len: usize) -> String {
    rand_string(rng, len, len)
}

/// Random digit string of the given length.
pub fn rand_digits(rng: &mut impl Rng, len: usize) -> String {
    (0..len).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
}

/// TPC-C zip code: four random digits followed by "11111".
pub fn rand_zip(rng: &mut impl Rng) -> String {
    format!("{}11111", rand_digits(rng, 4))
}

/// 16-digit phone number.
pub fn rand_phone(rng: &mut impl Rng) -> String {
    rand_digits(rng, 16)
}

/// Last name from the syllable table: the number's base-10 digits index
/// the table, one syllable per digit.
pub fn last_name(num: i64) -> String {
    let num = num.unsigned_abs();
    if num == 0 {
        return LAST_NAME_SYLLABLES[0].to_string();
    }
    let mut digits = Vec::new();
    let mut n = num;
    while n > 0 {
        digits.push((n % 10) as usize);
        n /= 10;
    }
    digits
        .iter()
        .rev()
        .map(|d| LAST_NAME_SYLLABLES[*d])
        .collect()
}

/// Last name for customer `c_id` at load time.
pub fn customer_last_name(c_id: i64) -> String {
    last_name((c_id.wrapping_mul(2_147_483_647)) % 10_000 / 100)
}

/// Item/stock filler data, 26-50 characters.
pub fn rand_data_string(rng: &mut impl Rng) -> String {
    rand_string(rng, 26, 50)
}

/// sbtest `c` column payload (CHAR(120)).
pub fn sbtest_c_value(rng: &mut impl Rng) -> String {
    rand_string_exact(rng, 120)
}

/// sbtest `pad` column payload (CHAR(60)).
pub fn sbtest_pad_value(rng: &mut impl Rng) -> String {
    rand_string_exact(rng, 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rand_string_length_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let s = rand_string(&mut rng, 26, 50);
            assert!((26..=50).contains(&s.len()));
        }
        assert_eq!(rand_string_exact(&mut rng, 24).len(), 24);
    }

    #[test]
    fn test_zip_shape() {
        let mut rng = StdRng::seed_from_u64(2);
        let zip = rand_zip(&mut rng);
        assert_eq!(zip.len(), 9);
        assert!(zip.ends_with("11111"));
        assert!(zip.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_phone_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        let phone = rand_phone(&mut rng);
        assert_eq!(phone.len(), 16);
        assert!(phone.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_last_name_digits() {
        assert_eq!(last_name(0), "BAR");
        assert_eq!(last_name(1), "OUGHT");
        assert_eq!(last_name(21), "ABLEOUGHT");
        assert_eq!(last_name(371), "PRICALLYOUGHT");
    }

    #[test]
    fn test_customer_last_name_deterministic() {
        assert_eq!(customer_last_name(1), customer_last_name(1));
        // index = (c * 2147483647) % 10000 / 100 is always in [0, 99]
        for c_id in 1..500 {
            let name = customer_last_name(c_id);
            assert!(!name.is_empty());
            assert!(name.len() <= 10); // at most two syllables
        }
    }

    #[test]
    fn test_sbtest_payload_widths() {
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(sbtest_c_value(&mut rng).len(), 120);
        assert_eq!(sbtest_pad_value(&mut rng).len(), 60);
    }
}
