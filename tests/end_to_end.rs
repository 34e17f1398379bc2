//! End-to-end runs through the public API

use approx::assert_relative_eq;
use faer::{mat, Mat};
use fastmdu::core::unfolding::stress::euclidean_between;
use fastmdu::{
    external_unfolding, mdu, parse_nnls_type, random_configuration, solve_nnls, ultrafast_mdu,
    weighted_mdu, FixedMask, MduError, MduParams, NnlsParams, NnlsType, UltrafastParams,
};

fn strict_params(max_iter: usize) -> MduParams {
    MduParams {
        max_iter,
        f_crit: 1e-6,
        echo: false,
    }
}

#[test]
fn line_problem_is_reproduced() {
    let delta = mat![[0.0, 2.0, 4.0], [2.0, 0.0, 2.0], [4.0, 2.0, 0.0]];
    let x = mat![[-1.0], [0.0], [1.0]];
    let y = mat![[-0.9], [0.1], [0.8]];

    let fit = mdu(delta.as_ref(), x, None, y, None, &strict_params(200)).unwrap();

    assert!(fit.f_value < 1e-3);
    assert_eq!(fit.history.len(), fit.last_iter + 1);
    for i in 0..3 {
        for j in 0..3 {
            assert_relative_eq!(fit.distances[(i, j)], delta[(i, j)], epsilon = 1e-6);
        }
    }
}

#[test]
fn unit_weights_match_unweighted_run() {
    let x0 = random_configuration(6, 2, 11).unwrap();
    let y0 = random_configuration(5, 2, 12).unwrap();
    let delta = euclidean_between(
        random_configuration(6, 2, 13).unwrap().as_ref(),
        random_configuration(5, 2, 14).unwrap().as_ref(),
    );
    let ones = Mat::<f64>::from_fn(6, 5, |_, _| 1.0);
    let params = strict_params(50);

    let plain = mdu(delta.as_ref(), x0.clone(), None, y0.clone(), None, &params).unwrap();
    let weighted = weighted_mdu(delta.as_ref(), ones.as_ref(), x0, None, y0, None, &params).unwrap();

    assert_eq!(plain.last_iter, weighted.last_iter);
    assert_relative_eq!(plain.f_value, weighted.f_value, epsilon = 1e-10);
}

#[test]
fn fixed_columns_anchor_the_solution() {
    let y = mat![[0.0, 0.0], [4.0, 0.0], [0.0, 3.0], [4.0, 3.0]];
    let truth = mat![[1.0, 1.0], [3.0, 2.0]];
    let delta = euclidean_between(truth.as_ref(), y.as_ref());
    let x = mat![[0.5, 0.5], [3.5, 2.5]];
    let fixed_y = FixedMask::from_col_major(4, 2, &[true; 8]).unwrap();

    let fit = mdu(
        delta.as_ref(),
        x,
        None,
        y.clone(),
        Some(fixed_y),
        &strict_params(500),
    )
    .unwrap();

    for j in 0..4 {
        for k in 0..2 {
            assert_eq!(fit.y[(j, k)], y[(j, k)]);
        }
    }
    assert!(fit.f_value <= fit.history[0]);
}

#[test]
fn external_fit_recovers_rows() {
    let fixed = mat![[0.0, 0.0], [4.0, 0.0], [0.0, 3.0], [4.0, 3.0]];
    let truth = mat![[1.0, 1.0], [3.0, 2.0]];
    let delta = euclidean_between(truth.as_ref(), fixed.as_ref());
    let params = MduParams {
        max_iter: 2000,
        f_crit: 1e-12,
        echo: false,
    };

    let fit = external_unfolding(
        delta.as_ref(),
        None,
        fixed.as_ref(),
        mat![[0.5, 0.5], [3.5, 2.5]],
        &params,
    )
    .unwrap();

    for i in 0..2 {
        for k in 0..2 {
            assert_relative_eq!(fit.z[(i, k)], truth[(i, k)], epsilon = 1e-3);
        }
    }
}

#[test]
fn ultrafast_then_majorization() {
    let delta = euclidean_between(
        random_configuration(10, 2, 1).unwrap().as_ref(),
        random_configuration(8, 2, 2).unwrap().as_ref(),
    );
    let mut x = random_configuration(10, 2, 3).unwrap();
    let mut y = random_configuration(8, 2, 4).unwrap();
    let uf_params = UltrafastParams {
        n_steps: 200,
        ..UltrafastParams::default()
    };

    ultrafast_mdu(delta.as_ref(), None, &mut x, None, &mut y, None, &uf_params).unwrap();
    let fit = mdu(delta.as_ref(), x, None, y, None, &strict_params(100)).unwrap();

    assert!(fit.f_value.is_finite());
    assert!(fit.f_value <= fit.history[0]);
}

#[test]
fn nnls_by_name() {
    let a = mat![
        [1.0, 0.2, 0.0],
        [0.1, 1.0, 0.3],
        [0.0, 0.2, 1.0],
        [0.5, 0.1, 0.2],
        [0.3, 0.4, 0.1],
        [0.2, 0.0, 0.6]
    ];
    let b = [1.0, -1.0, 0.5, 0.2, -0.3, 0.8];
    let nnls_type = parse_nnls_type("FastNNLS").unwrap();
    assert_eq!(nnls_type, NnlsType::Fast);

    let res = solve_nnls(a.as_ref(), &b, None, nnls_type, &NnlsParams::default()).unwrap();

    assert!(res.converged);
    assert_relative_eq!(res.x[0], 0.7035781919665105, epsilon = 1e-8);
    assert_relative_eq!(res.x[1], 0.0, epsilon = 1e-12);
    assert_relative_eq!(res.x[2], 0.32866540416625134, epsilon = 1e-8);
}

#[test]
fn negative_dissimilarity_is_rejected() {
    let delta = mat![[1.0, -1.0]];
    let res = mdu(
        delta.as_ref(),
        mat![[0.0]],
        None,
        mat![[1.0], [2.0]],
        None,
        &MduParams::default(),
    );

    assert!(matches!(res, Err(MduError::InvalidParameter(_))));
}
