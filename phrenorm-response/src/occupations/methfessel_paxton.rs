// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The Methfessel-Paxton expansion of the step function in Hermite polynomials
//!
//! S_N(x) = (1 - erf x) / 2 + sum_{n=1}^N A_n H_{2n-1}(x) exp(-x^2)
//! D_N(x) = sum_{n=0}^N A_n H_{2n}(x) exp(-x^2)
//! D'_N(x) = -sum_{n=0}^N A_n H_{2n+1}(x) exp(-x^2)
//!
//! with A_n = (-1)^n / (sqrt(pi) n! 4^n).

use std::f64::consts::PI;

pub(super) struct Expansion {
    pub(super) step: f64,
    pub(super) delta: f64,
    pub(super) delta_prime: f64,
}

pub(super) fn expansion(x: f64, order: usize) -> Expansion {
    let gaussian = (-x * x).exp() / PI.sqrt();
    let mut step = 0.5 * (1.0 - libm::erf(x));
    let mut delta = 0.0;
    let mut delta_prime = 0.0;

    // H_{2n - 1} and H_{2n}, starting from H_{-1} = 0 and H_0 = 1
    let mut previous = 0.0;
    let mut current = 1.0;
    let mut a = 1.0;

    for n in 0..=order {
        let odd = 2.0 * x * current - 4.0 * n as f64 * previous;
        delta += a * current;
        delta_prime -= a * odd;

        let next_a = -a / (4.0 * (n + 1) as f64);
        if n < order {
            step += next_a * odd * gaussian;
        }
        let even = 2.0 * x * odd - 2.0 * (2 * n + 1) as f64 * current;
        previous = odd;
        current = even;
        a = next_a;
    }

    Expansion {
        step,
        delta: delta * gaussian,
        delta_prime: delta_prime * gaussian,
    }
}
