//! Distribution functions needed by the estimators: the standard normal
//! quantile and the chi-squared survival function.
//!
//! The quantile follows the Cephes `ndtri` rational approximations with the
//! same evaluation order, so critical values match the usual scientific
//! stacks to the last bit. The chi-squared tail comes from `statrs`.

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// exp(-2): below this the tail expansion is used.
const TAIL_THRESHOLD: f64 = 0.135_335_283_236_612_691_89;
const SQRT_2PI: f64 = 2.506_628_274_631_000_502_42;

#[allow(clippy::excessive_precision)]
const CENTRAL_P: [f64; 5] = [
    -5.996_335_010_141_078_952_67e1,
    9.800_107_541_859_996_615_36e1,
    -5.667_628_574_690_702_934_39e1,
    1.393_126_093_872_796_795_03e1,
    -1.239_165_838_673_812_580_16e0,
];
#[allow(clippy::excessive_precision)]
const CENTRAL_Q: [f64; 8] = [
    1.954_488_583_381_417_598_34e0,
    4.676_279_128_988_815_384_53e0,
    8.636_024_213_908_905_905_75e1,
    -2.254_626_878_541_193_705_27e2,
    2.002_602_123_800_606_603_59e2,
    -8.203_722_561_683_333_399_12e1,
    1.590_562_251_262_116_955_15e1,
    -1.183_316_211_213_300_031_42e0,
];
#[allow(clippy::excessive_precision)]
const TAIL_P: [f64; 9] = [
    4.055_448_923_059_624_199_23e0,
    3.152_510_945_998_938_661_54e1,
    5.716_281_922_464_212_881_62e1,
    4.408_050_738_932_008_347_00e1,
    1.468_495_619_288_580_240_14e1,
    2.186_633_068_507_902_675_39e0,
    -1.402_560_791_713_544_958_75e-1,
    -3.504_246_268_278_482_034_18e-2,
    -8.574_567_851_546_854_136_11e-4,
];
#[allow(clippy::excessive_precision)]
const TAIL_Q: [f64; 8] = [
    1.577_998_832_564_667_497_31e1,
    4.539_076_351_288_792_105_84e1,
    4.131_720_382_546_720_304_40e1,
    1.504_253_856_929_075_034_08e1,
    2.504_649_462_083_094_159_79e0,
    -1.421_829_228_547_877_885_74e-1,
    -3.808_064_076_915_782_771_94e-2,
    -9.332_594_808_954_574_273_72e-4,
];
#[allow(clippy::excessive_precision)]
const FAR_TAIL_P: [f64; 9] = [
    3.237_748_917_769_460_359_70e0,
    6.915_228_890_689_842_116_95e0,
    3.938_810_252_924_744_434_15e0,
    1.333_034_608_158_075_423_89e0,
    2.014_853_895_491_790_815_38e-1,
    1.237_166_348_178_200_213_58e-2,
    3.015_815_535_082_354_160_07e-4,
    2.658_069_746_867_375_508_32e-6,
    6.239_745_391_849_832_937_30e-9,
];
#[allow(clippy::excessive_precision)]
const FAR_TAIL_Q: [f64; 8] = [
    6.024_270_393_647_420_142_55e0,
    3.679_835_638_561_608_594_03e0,
    1.377_020_994_890_813_302_71e0,
    2.162_369_935_944_966_358_90e-1,
    1.342_040_060_885_431_890_37e-2,
    3.280_144_646_821_277_391_04e-4,
    2.892_478_647_453_806_839_36e-6,
    6.790_194_080_099_812_744_25e-9,
];

/// Polynomial with the leading coefficient first.
fn polevl(x: f64, coeffs: &[f64]) -> f64 {
    coeffs[1..].iter().fold(coeffs[0], |acc, c| acc * x + c)
}

/// Like [`polevl`] with an implicit leading coefficient of 1.
fn p1evl(x: f64, coeffs: &[f64]) -> f64 {
    coeffs[1..].iter().fold(x + coeffs[0], |acc, c| acc * x + c)
}

/// Inverse CDF of the standard normal distribution.
///
/// Returns the matching infinity at 0 and 1, NaN outside [0, 1].
pub fn normal_quantile(p: f64) -> f64 {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    let mut y = p;
    let mut negate = true;
    if y > 1.0 - TAIL_THRESHOLD {
        y = 1.0 - y;
        negate = false;
    }

    if y > TAIL_THRESHOLD {
        let y = y - 0.5;
        let y2 = y * y;
        let x = y + y * (y2 * polevl(y2, &CENTRAL_P) / p1evl(y2, &CENTRAL_Q));
        return x * SQRT_2PI;
    }

    let x = (-2.0 * y.ln()).sqrt();
    let x0 = x - x.ln() / x;
    let z = 1.0 / x;
    let x1 = if x < 8.0 {
        z * polevl(z, &TAIL_P) / p1evl(z, &TAIL_Q)
    } else {
        z * polevl(z, &FAR_TAIL_P) / p1evl(z, &FAR_TAIL_Q)
    };
    let x = x0 - x1;
    if negate {
        -x
    } else {
        x
    }
}

/// Two-tailed critical value of the standard normal for the given alpha.
pub fn two_tailed_critical_value(alpha_level: f64) -> f64 {
    normal_quantile(1.0 - alpha_level / 2.0)
}

/// P(X > statistic) for X ~ χ²(df). Zero degrees of freedom or a
/// non-positive statistic give 1.
pub fn chi_squared_survival(statistic: f64, df: usize) -> f64 {
    if df == 0 || statistic <= 0.0 {
        return 1.0;
    }
    match ChiSquared::new(df as f64) {
        Ok(distribution) => distribution.sf(statistic),
        Err(_) => f64::NAN,
    }
}
