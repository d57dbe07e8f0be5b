//! Polynomial-approximated normal CDF and the upper-tail chi-squared
//! probability, adapted from the public-domain ENT test suite (Gary
//! Perlman / John Walker), by way of bit-babbler's `chisq.h`.

const Z_MAX: f64 = 6.0;

/// Cumulative probability from -infinity to `z` for the standard normal
/// distribution. Accurate to six digits for `|z| < 6`; saturates to 0.0
/// or 1.0 outside that range.
pub fn poz(z: f64) -> f64 {
    if z == 0.0 {
        return 0.5;
    }

    let mut y = 0.5 * z.abs();
    let x;

    if y >= Z_MAX * 0.5 {
        x = 1.0;
    } else if y < 1.0 {
        let w = y * y;
        x = ((((((((0.000124818987 * w - 0.001075204047) * w + 0.005198775019) * w
            - 0.019198292004)
            * w
            + 0.059054035642)
            * w
            - 0.151968751364)
            * w
            + 0.319152932694)
            * w
            - 0.531923007300)
            * w
            + 0.797884560593)
            * y
            * 2.0;
    } else {
        y -= 2.0;
        x = (((((((((((((-0.000045255659 * y + 0.000152529290) * y - 0.000019538132) * y
            - 0.000676904986)
            * y
            + 0.001390604284)
            * y
            - 0.000794620820)
            * y
            - 0.002034254874)
            * y
            + 0.006549791214)
            * y
            - 0.010557625006)
            * y
            + 0.011630447319)
            * y
            - 0.009279453341)
            * y
            + 0.005353579108)
            * y
            - 0.002141268741)
            * y
            + 0.000535310849)
            * y
            + 0.999936657524;
    }

    if z > 0.0 {
        (x + 1.0) * 0.5
    } else {
        (1.0 - x) * 0.5
    }
}

const LOG_SQRT_PI: f64 = 0.5723649429247000870717135;
const I_SQRT_PI: f64 = 0.5641895835477562869480795;
const BIGX: f64 = 20.0;

fn ex(n: f64) -> f64 {
    if n < -BIGX {
        0.0
    } else {
        n.exp()
    }
}

/// Upper-tail probability of a chi-squared value `x` with `df` degrees
/// of freedom (Hill & Pike, Algorithm 299, with the June 1985 rounding
/// fix). Returns 1.0 for `x <= 0.0` or `df < 1`.
pub fn pochisq(x: f64, df: u32) -> f64 {
    if x <= 0.0 || df < 1 {
        return 1.0;
    }

    let even = df % 2 == 0;
    let a = 0.5 * x;
    let mut y = 0.0;

    if df > 1 {
        y = ex(-a);
    }

    let mut s = if even { y } else { 2.0 * poz(-x.sqrt()) };

    if df > 2 {
        let xx = 0.5 * (df as f64 - 1.0);
        let mut z = if even { 1.0 } else { 0.5 };

        if a > BIGX {
            let mut e = if even { 0.0 } else { LOG_SQRT_PI };
            let c = a.ln();
            while z <= xx {
                e = z.ln() + e;
                s += ex(c * z - a - e);
                z += 1.0;
            }
            return s.clamp(0.0, 1.0);
        }

        let mut e = if even { 1.0 } else { I_SQRT_PI / a.sqrt() };
        let mut c = 0.0;
        while z <= xx {
            e *= a / z;
            c += e;
            z += 1.0;
        }
        return (c * y + s).clamp(0.0, 1.0);
    }

    s.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poz_symmetry() {
        for &z in &[0.1, 0.5, 1.0, 2.0, 3.5, 5.9] {
            let sum = poz(-z) + poz(z);
            assert!((sum - 1.0).abs() < 1e-6, "z={} sum={}", z, sum);
        }
    }

    #[test]
    fn test_poz_zero_is_half() {
        assert!((poz(0.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_poz_saturates() {
        assert_eq!(poz(10.0), 1.0);
        assert_eq!(poz(-10.0), 0.0);
    }

    #[test]
    fn test_pochisq_zero_x_is_one() {
        for df in 1..=10u32 {
            assert_eq!(pochisq(0.0, df), 1.0);
            assert_eq!(pochisq(-5.0, df), 1.0);
        }
    }

    #[test]
    fn test_pochisq_zero_df_is_one() {
        assert_eq!(pochisq(5.0, 0), 1.0);
    }

    #[test]
    fn test_pochisq_monotonic() {
        let mut prev = pochisq(0.1, 255);
        for i in 1..50 {
            let x = 0.1 + i as f64 * 20.0;
            let cur = pochisq(x, 255);
            assert!(cur <= prev + 1e-9, "not monotonic at x={}: {} > {}", x, cur, prev);
            prev = cur;
        }
    }

    #[test]
    fn test_pochisq_bounds() {
        for df in [1u32, 2, 3, 255, 65535] {
            for x in [0.5, 10.0, 100.0, 1000.0, 100_000.0] {
                let p = pochisq(x, df);
                assert!((0.0..=1.0).contains(&p), "df={} x={} p={}", df, x, p);
            }
        }
    }

    #[test]
    fn test_pochisq_df2_fast_path() {
        // For df=2, pochisq(x,2) == exp(-x/2) exactly.
        let p = pochisq(4.0, 2);
        assert!((p - (-2.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_pochisq_expected_mean() {
        // chi-squared at its own df should give roughly p ~ 0.5 for large df.
        let p = pochisq(255.0, 255);
        assert!((p - 0.5).abs() < 0.05, "p={}", p);
    }
}
