//! Prime helpers for sizing the hash table

/// Trial-division primality test.
pub fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut i = 3;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

/// Smallest prime `>= n`.
pub fn next_prime(mut n: usize) -> usize {
    while !is_prime(n) {
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_prime() {
        let primes: Vec<usize> = (0..30).filter(|&n| is_prime(n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert!(is_prime(601));
        assert!(!is_prime(1202));
    }

    #[test]
    fn test_next_prime() {
        assert_eq!(next_prime(601), 601);
        assert_eq!(next_prime(1202), 1213);
        assert_eq!(next_prime(0), 2);
    }
}
