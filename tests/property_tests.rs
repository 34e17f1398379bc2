//! Property-based tests for the unfolding engines
//!
//! Uses proptest to check invariants across random problem sizes and seeds

use faer::Mat;
use fastmdu::core::unfolding::data::CRIT;
use fastmdu::core::unfolding::stress::euclidean_between;
use fastmdu::{
    random_configuration, ultrafast_mdu, weighted_mdu, FixedMask, MduParams, UltrafastParams,
};
use proptest::prelude::*;

fn planted(n: usize, m: usize, p: usize, seed: u64) -> Mat<f64> {
    let x = random_configuration(n, p, seed).unwrap();
    let y = random_configuration(m, p, seed + 1).unwrap();
    euclidean_between(x.as_ref(), y.as_ref())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Majorization never increases the stress beyond the divergence tolerance
    #[test]
    fn test_weighted_history_monotone(
        n in 3usize..7,
        m in 3usize..6,
        p in 1usize..3,
        seed in 0u64..1000,
    ) {
        let delta = planted(n, m, p, seed);
        let raw = random_configuration(n, m, seed + 2).unwrap();
        let w = Mat::from_fn(n, m, |i, j| raw[(i, j)].abs() + 0.1);
        let x = random_configuration(n, p, seed + 3).unwrap();
        let y = random_configuration(m, p, seed + 4).unwrap();
        let params = MduParams {
            max_iter: 30,
            f_crit: 1e-8,
            echo: false,
        };

        let fit = weighted_mdu(delta.as_ref(), w.as_ref(), x, None, y, None, &params).unwrap();

        prop_assert_eq!(fit.history.len(), fit.last_iter + 1);
        prop_assert!(fit.f_value.is_finite());
        for pair in fit.history.windows(2) {
            prop_assert!(pair[1] <= pair[0] + CRIT,
                "stress increased from {} to {}", pair[0], pair[1]);
        }
    }

    /// Two stochastic runs with the same seed are identical
    #[test]
    fn test_ultrafast_deterministic(
        n in 2usize..8,
        m in 2usize..8,
        seed in any::<u64>(),
    ) {
        let delta = planted(n, m, 2, 7);
        let params = UltrafastParams {
            n_steps: 20,
            min_rate: 0.05,
            seed,
        };

        let run = || {
            let mut x = random_configuration(n, 2, 8).unwrap();
            let mut y = random_configuration(m, 2, 9).unwrap();
            let summary = ultrafast_mdu(
                delta.as_ref(), None, &mut x, None, &mut y, None, &params,
            ).unwrap();
            (x, y, summary.n_updates)
        };
        let (x1, y1, u1) = run();
        let (x2, y2, u2) = run();

        prop_assert_eq!(u1, u2);
        for i in 0..n {
            for k in 0..2 {
                prop_assert_eq!(x1[(i, k)].to_bits(), x2[(i, k)].to_bits());
            }
        }
        for j in 0..m {
            for k in 0..2 {
                prop_assert_eq!(y1[(j, k)].to_bits(), y2[(j, k)].to_bits());
            }
        }
    }

    /// Mask flags are read in column-major order
    #[test]
    fn test_mask_column_major(
        (n, p, flags) in (1usize..6, 1usize..4)
            .prop_flat_map(|(n, p)| (Just(n), Just(p), prop::collection::vec(any::<bool>(), n * p))),
    ) {
        let mask = FixedMask::from_col_major(n, p, &flags).unwrap();

        prop_assert_eq!(mask.count(), flags.iter().filter(|&&f| f).count());
        for k in 0..p {
            for i in 0..n {
                prop_assert_eq!(mask.get(i, k), flags[i + k * n]);
            }
        }
    }
}
