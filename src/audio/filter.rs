//! Per-sample pre-filters applied to a PCM stream before segmentation.

/// Stateful `sample -> sample` transform.
pub trait SampleFilter {
    fn apply(&mut self, sample: f64) -> f64;

    /// Forgets history carried over from a previous stream.
    fn reset(&mut self) {}
}

impl<F> SampleFilter for F
where
    F: FnMut(f64) -> f64,
{
    fn apply(&mut self, sample: f64) -> f64 {
        self(sample)
    }
}

const BAND_PASS_A: [f64; 9] = [
    0.13458, 0.0, -0.53830, 0.0, 0.80746, 0.0, -0.53830, 0.0, 0.13458,
];
const BAND_PASS_B: [f64; 9] = [
    1.0, -2.472581, 2.132717, -1.283293, 1.413803, -1.021015, 0.262922, -0.057071, 0.035056,
];

/// Direct-form IIR filter, `y[n] = sum a[i] x[n-i] - sum b[i] y[n-i]`.
///
/// The `b[0]` term multiplies the current output while it is still zero, so
/// it has no effect; coefficients are used as given.
#[derive(Debug, Clone)]
pub struct IirFilter {
    a: Vec<f64>,
    b: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl IirFilter {
    /// Builds a filter from equal-length coefficient sets.
    pub fn new(a: &[f64], b: &[f64]) -> anyhow::Result<Self> {
        anyhow::ensure!(!a.is_empty(), "filter needs at least one coefficient");
        anyhow::ensure!(
            a.len() == b.len(),
            "coefficient sets differ in length ({} vs {})",
            a.len(),
            b.len()
        );
        Ok(Self {
            a: a.to_vec(),
            b: b.to_vec(),
            x: vec![0.0; a.len()],
            y: vec![0.0; a.len()],
        })
    }

    /// Nine-tap band-pass used on compressed field recordings.
    pub fn band_pass() -> Self {
        Self {
            a: BAND_PASS_A.to_vec(),
            b: BAND_PASS_B.to_vec(),
            x: vec![0.0; BAND_PASS_A.len()],
            y: vec![0.0; BAND_PASS_A.len()],
        }
    }

    pub fn taps(&self) -> usize {
        self.a.len()
    }

    /// Runs up to `taps()` samples through the filter to warm up its state.
    pub fn prime(&mut self, data: &[f64]) {
        for &sample in data.iter().take(self.taps()) {
            self.apply(sample);
        }
    }
}

impl SampleFilter for IirFilter {
    fn apply(&mut self, sample: f64) -> f64 {
        let n = self.a.len();
        self.x.rotate_left(1);
        self.y.rotate_left(1);
        self.x[n - 1] = sample;
        self.y[n - 1] = 0.0;
        let mut out = 0.0;
        for i in 0..n {
            out += self.a[i] * self.x[n - 1 - i] - self.b[i] * self.y[n - 1 - i];
        }
        self.y[n - 1] = out;
        out
    }

    fn reset(&mut self) {
        self.x.fill(0.0);
        self.y.fill(0.0);
    }
}
