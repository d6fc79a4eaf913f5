//! Quadratic probe sequence and capacity selection
//!
//! Probe `j` of a key whose home slot is `h` visits
//!
//! ```text
//! h, h + 1², h - 1², h + 2², h - 2², h + 3², ...   (mod N)
//! ```
//!
//! When `N` is a prime congruent to 3 mod 4 the first `N` positions of this
//! sequence are pairwise distinct, so a walk of `N` probes visits every slot
//! exactly once.

/// Whether `n` is prime
pub fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let n = n as u64;
    let mut i = 5u64;
    while i * i <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Whether `n` is a usable table capacity: a prime congruent to 3 mod 4
pub fn is_valid_capacity(n: u32) -> bool {
    n % 4 == 3 && is_prime(n)
}

/// Largest usable capacity not above `limit`
pub fn largest_capacity_at_most(limit: u32) -> Option<u32> {
    if limit < 3 {
        return None;
    }
    // Start from the largest value ≡ 3 (mod 4) at or below the limit.
    let mut n = limit - (limit + 1) % 4;
    loop {
        if is_prime(n) {
            return Some(n);
        }
        if n < 7 {
            return None;
        }
        n -= 4;
    }
}

/// Iterator over the `N` slot indices a key's probe walk visits
#[derive(Debug, Clone)]
pub struct ProbeSequence {
    home: u64,
    capacity: u64,
    step: u64,
}

impl ProbeSequence {
    /// Probe walk for a key hash over `capacity` slots
    pub fn new(hash: u64, capacity: u32) -> Self {
        debug_assert!(capacity > 0);
        let capacity = capacity as u64;
        Self {
            home: hash % capacity,
            capacity,
            step: 0,
        }
    }

    /// Home slot of the walk
    pub fn home(&self) -> u32 {
        self.home as u32
    }

    fn index_at(&self, step: u64) -> u64 {
        if step == 0 {
            return self.home;
        }
        let k = (step + 1) / 2;
        let offset = (k % self.capacity) * (k % self.capacity) % self.capacity;
        if step % 2 == 1 {
            (self.home + offset) % self.capacity
        } else {
            (self.home + self.capacity - offset) % self.capacity
        }
    }
}

impl Iterator for ProbeSequence {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.step >= self.capacity {
            return None;
        }
        let index = self.index_at(self.step);
        self.step += 1;
        Some(index as u32)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.capacity - self.step) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ProbeSequence {}

#[cfg(test)]
mod tests {
    use super::*;

    fn covers_all(capacity: u32, hash: u64) -> bool {
        let mut seen = vec![false; capacity as usize];
        for index in ProbeSequence::new(hash, capacity) {
            if seen[index as usize] {
                return false;
            }
            seen[index as usize] = true;
        }
        seen.iter().all(|&s| s)
    }

    #[test]
    fn test_primes() {
        let primes: Vec<u32> = (0..40).filter(|&n| is_prime(n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37]);
        assert!(is_prime(1019));
        assert!(!is_prime(1021 * 1031));
    }

    #[test]
    fn test_valid_capacities() {
        assert!(is_valid_capacity(3));
        assert!(is_valid_capacity(7));
        assert!(is_valid_capacity(1019));
        assert!(!is_valid_capacity(13));
        assert!(!is_valid_capacity(15));
        assert!(!is_valid_capacity(2));
    }

    #[test]
    fn test_largest_capacity_at_most() {
        assert_eq!(largest_capacity_at_most(2), None);
        assert_eq!(largest_capacity_at_most(3), Some(3));
        assert_eq!(largest_capacity_at_most(6), Some(3));
        assert_eq!(largest_capacity_at_most(10), Some(7));
        assert_eq!(largest_capacity_at_most(22), Some(19));
        assert_eq!(largest_capacity_at_most(1020), Some(1019));
        for limit in 3..2000 {
            let n = largest_capacity_at_most(limit).unwrap();
            assert!(n <= limit && is_valid_capacity(n));
        }
    }

    #[test]
    fn test_probe_visits_every_slot_once() {
        for &capacity in &[3u32, 7, 11, 19, 23, 31, 43, 1019] {
            for home in 0..capacity as u64 {
                assert!(covers_all(capacity, home), "N={} h={}", capacity, home);
            }
        }
    }

    #[test]
    fn test_probe_large_hash() {
        assert!(covers_all(1019, u64::MAX));
        assert_eq!(ProbeSequence::new(u64::MAX, 7).home(), (u64::MAX % 7) as u32);
    }

    #[test]
    fn test_probe_needs_3_mod_4() {
        // 13 is prime but 1 mod 4: -1 is a quadratic residue and positions repeat
        assert!(!covers_all(13, 0));
    }

    #[test]
    fn test_probe_order() {
        let seq: Vec<u32> = ProbeSequence::new(0, 7).collect();
        assert_eq!(seq, vec![0, 1, 6, 4, 3, 2, 5]);
        assert_eq!(ProbeSequence::new(5, 7).len(), 7);
    }
}
