//! Convolution kernels and float gray planes.

pub mod kernel {
    use nalgebra as na;

    pub trait Kernel {
        fn size(&self) -> usize;
        fn values(&self) -> &na::DMatrix<f64>;
    }

    pub struct GaussianKernel {
        values: na::DMatrix<f64>,
    }

    impl GaussianKernel {
        pub fn new(size: usize, sigma: f64) -> Self {
            let mut values = na::DMatrix::zeros(size, size);
            let c = (size as f64 - 1.0) / 2.0;
            for i in 0..size {
                for j in 0..size {
                    let x = i as f64 - c;
                    let y = j as f64 - c;
                    values[(i, j)] = (-(x * x + y * y) / (2.0 * sigma * sigma)).exp();
                }
            }
            let sum = values.sum();
            values /= sum;
            Self { values }
        }

        /// Odd kernel size covering +-3 sigma.
        pub fn for_sigma(sigma: f64) -> Self {
            let radius = (3.0 * sigma).ceil().max(1.0) as usize;
            Self::new(2 * radius + 1, sigma)
        }
    }

    impl Kernel for GaussianKernel {
        fn size(&self) -> usize {
            self.values.nrows()
        }
        fn values(&self) -> &na::DMatrix<f64> {
            &self.values
        }
    }

    #[derive(Clone, Copy, Debug)]
    pub enum Direction {
        X,
        Y,
    }

    pub struct SobelKernel {
        values: na::DMatrix<f64>,
    }

    impl SobelKernel {
        pub fn new(direction: Direction) -> Self {
            // row index is y, column index is x
            let values = match direction {
                Direction::X => na::DMatrix::from_row_slice(
                    3,
                    3,
                    &[-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0],
                ),
                Direction::Y => na::DMatrix::from_row_slice(
                    3,
                    3,
                    &[-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0],
                ),
            };
            Self { values }
        }
    }

    impl Kernel for SobelKernel {
        fn size(&self) -> usize {
            3
        }

        fn values(&self) -> &na::DMatrix<f64> {
            &self.values
        }
    }
}

use kernel::Kernel;

/// Row-major float image, one channel.
#[derive(Clone, Debug, PartialEq)]
pub struct GrayF64 {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f64>,
}

impl GrayF64 {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width as usize) * (height as usize)],
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.data[(y as usize) * (self.width as usize) + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, v: f64) {
        let w = self.width as usize;
        self.data[(y as usize) * w + x as usize] = v;
    }

    /// Sample with clamp-to-edge addressing.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> f64 {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(x, y)
    }

    pub fn max(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Luma conversion of any image into a float plane in [0, 255].
pub fn to_gray_f64(img: &image::DynamicImage) -> GrayF64 {
    let luma = img.to_luma8();
    let (width, height) = luma.dimensions();
    GrayF64 {
        width,
        height,
        data: luma.into_raw().into_iter().map(f64::from).collect(),
    }
}

/// Centered 2D convolution (correlation orientation), clamp-to-edge borders.
pub fn filter<K: Kernel>(input: &GrayF64, kernel: &K) -> GrayF64 {
    let size = kernel.size();
    let half = (size / 2) as i64;
    let values = kernel.values();
    let mut output = GrayF64::new(input.width, input.height);
    if input.width == 0 || input.height == 0 {
        return output;
    }

    for y in 0..input.height {
        for x in 0..input.width {
            let mut sum = 0f64;
            for ky in 0..size {
                for kx in 0..size {
                    let sx = x as i64 + kx as i64 - half;
                    let sy = y as i64 + ky as i64 - half;
                    sum += values[(ky, kx)] * input.get_clamped(sx, sy);
                }
            }
            output.set(x, y, sum);
        }
    }

    output
}

/// Horizontal and vertical Sobel derivatives.
pub fn gradients(input: &GrayF64) -> (GrayF64, GrayF64) {
    let gx = filter(input, &kernel::SobelKernel::new(kernel::Direction::X));
    let gy = filter(input, &kernel::SobelKernel::new(kernel::Direction::Y));
    (gx, gy)
}

/// Separable Gaussian blur; matches `filter` with `GaussianKernel::for_sigma`.
pub fn gaussian_blur(input: &GrayF64, sigma: f64) -> GrayF64 {
    // the 2D kernel is an outer product, so its normalized center row is the 1D tap set
    let kernel = kernel::GaussianKernel::for_sigma(sigma);
    let center = kernel.size() / 2;
    let radius = center as i64;
    let row = kernel.values().row(center);
    let sum = row.sum();
    let taps: Vec<f64> = row.iter().map(|v| v / sum).collect();

    let mut tmp = GrayF64::new(input.width, input.height);
    for y in 0..input.height {
        for x in 0..input.width {
            let v = taps
                .iter()
                .enumerate()
                .map(|(i, t)| t * input.get_clamped(x as i64 + i as i64 - radius, y as i64))
                .sum();
            tmp.set(x, y, v);
        }
    }
    let mut output = GrayF64::new(input.width, input.height);
    for y in 0..input.height {
        for x in 0..input.width {
            let v = taps
                .iter()
                .enumerate()
                .map(|(i, t)| t * tmp.get_clamped(x as i64, y as i64 + i as i64 - radius))
                .sum();
            output.set(x, y, v);
        }
    }
    output
}

/// Pointwise product of two planes of equal size.
pub fn product(a: &GrayF64, b: &GrayF64) -> GrayF64 {
    debug_assert_eq!((a.width, a.height), (b.width, b.height));
    GrayF64 {
        width: a.width,
        height: a.height,
        data: a.data.iter().zip(&b.data).map(|(x, y)| x * y).collect(),
    }
}

#[cfg(test)]
mod test {
    use super::kernel::*;
    use super::*;

    fn ramp(width: u32, height: u32) -> GrayF64 {
        let mut img = GrayF64::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.set(x, y, (x * 10) as f64);
            }
        }
        img
    }

    #[test]
    fn test_gaussian_kernel() {
        let kernel = GaussianKernel::new(3, 2.0);
        assert_eq!(kernel.size(), 3);
        assert_eq!(kernel.values().nrows(), 3);
        assert_eq!(kernel.values().ncols(), 3);
        assert!((kernel.values().sum() - 1.0).abs() < 1e-9);
        assert_eq!(GaussianKernel::for_sigma(1.0).size(), 7);
    }

    #[test]
    fn test_gaussian_keeps_constant_image() {
        let mut img = GrayF64::new(8, 6);
        img.data.iter_mut().for_each(|v| *v = 42.0);
        let blurred = gaussian_blur(&img, 1.5);
        assert!(blurred.data.iter().all(|v| (v - 42.0).abs() < 1e-9));
    }

    #[test]
    fn test_separable_blur_matches_kernel() {
        let mut img = ramp(12, 10);
        img.set(5, 5, 255.0);
        let a = gaussian_blur(&img, 1.0);
        let b = filter(&img, &GaussianKernel::for_sigma(1.0));
        for (x, y) in a.data.iter().zip(&b.data) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sobel_on_ramp() {
        let (gx, gy) = gradients(&ramp(9, 9));
        // interior: 10 per pixel, sobel weights sum to 4 on each side, span 2
        assert!((gx.get(4, 4) - 80.0).abs() < 1e-9);
        assert!(gy.get(4, 4).abs() < 1e-9);
    }

    #[test]
    fn test_to_gray() {
        let img = image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            3,
            2,
            image::Luma([17u8]),
        ));
        let gray = to_gray_f64(&img);
        assert_eq!((gray.width, gray.height), (3, 2));
        assert!(gray.data.iter().all(|&v| v == 17.0));
    }
}
