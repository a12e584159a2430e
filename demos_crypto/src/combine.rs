use crate::*;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use num_bigint::BigUint;
use subtle::ConstantTimeEq;

/// Homomorphically add commitments. An empty list gives the identity commitment.
pub fn add_com(coms: &[Com]) -> Com {
    let mut c1 = RistrettoPoint::identity();
    let mut c2 = RistrettoPoint::identity();
    for com in coms {
        c1 += com.c1;
        c2 += com.c2;
    }
    Com { c1, c2 }
}

/// Add openings modulo the group order. An empty list gives the zero opening.
pub fn add_decom(decoms: &[Decom]) -> Decom {
    let order = Group::Ristretto255.order();

    let randomness: Scalar = decoms.iter().map(|d| d.randomness).sum();
    let message = decoms
        .iter()
        .fold(BigUint::from(0u32), |acc, d| (acc + &d.message) % &order);

    Decom {
        randomness,
        message,
    }
}

/// Check that `decom` opens `com` under `key`.
///
/// Point comparison is constant time; the scalar multiplications are the
/// constant-time dalek implementations.
pub fn verify_com(key: &Key, com: &Com, decom: &Decom) -> bool {
    if decom.message >= key.group.order() {
        return false;
    }

    let expected = commit(key, &decom.message, &decom.randomness);
    let ok = com.c1.ct_eq(&expected.c1) & com.c2.ct_eq(&expected.c2);
    ok.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(options: u32, parts: u32) -> (Key, Vec<BallotPart>) {
        let mut rng = rand::rngs::OsRng {};
        let key = key_gen(Group::Ristretto255, 50, options, &mut rng).unwrap();
        let parts = gen_ballot(&key, parts);
        (key, parts)
    }

    #[test]
    fn add_com_is_associative() {
        let (_key, parts) = cells(3, 4);
        let coms: Vec<Com> = parts.iter().flatten().map(|c| c.com.clone()).collect();

        let (l1, l2) = coms.split_at(5);
        let whole = add_com(&coms);
        let split = add_com(&[add_com(l1), add_com(l2)]);
        assert_eq!(whole, split);

        // Order does not matter
        let mut reversed = coms.clone();
        reversed.reverse();
        assert_eq!(add_com(&reversed), whole);

        // Same input, same output
        assert_eq!(add_com(&coms), whole);
    }

    #[test]
    fn combined_opening_verifies() {
        let (key, parts) = cells(2, 6);

        // Option 0 on the first part, option 1 on the next two
        let selected = vec![&parts[0][0], &parts[1][1], &parts[2][1]];
        let coms: Vec<Com> = selected.iter().map(|c| c.com.clone()).collect();
        let decoms: Vec<Decom> = selected.iter().map(|c| c.decom.clone()).collect();

        let com = add_com(&coms);
        let decom = add_decom(&decoms);
        assert_eq!(add_decom(&decoms), decom);
        assert!(verify_com(&key, &com, &decom));
        assert_eq!(decode_tally(&decom.message, key.ballots, key.options).unwrap(), vec![1, 2]);
    }

    #[test]
    fn empty_combination() {
        let mut rng = rand::rngs::OsRng {};
        let key = key_gen(Group::Ristretto255, 5, 2, &mut rng).unwrap();

        let com = add_com(&[]);
        let decom = add_decom(&[]);
        assert_eq!(com.c1, RistrettoPoint::identity());
        assert_eq!(com.c2, RistrettoPoint::identity());
        assert_eq!(decom.randomness, Scalar::zero());
        assert_eq!(decom.message, BigUint::from(0u32));
        assert!(verify_com(&key, &com, &decom));
    }

    #[test]
    fn tampered_opening_fails() {
        let (key, parts) = cells(2, 2);
        let cell = &parts[0][0];

        let mut decom = cell.decom.clone();
        decom.message += 1u32;
        assert!(!verify_com(&key, &cell.com, &decom));

        let mut decom = cell.decom.clone();
        decom.randomness += Scalar::one();
        assert!(!verify_com(&key, &cell.com, &decom));

        let mut decom = cell.decom.clone();
        decom.message = key.group.order() + &cell.decom.message;
        assert!(!verify_com(&key, &cell.com, &decom));
    }
}
