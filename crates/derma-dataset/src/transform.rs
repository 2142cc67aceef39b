//! Image transforms applied before batching.
//!
//! Every random transform draws from the RNG it is handed, so a pipeline run
//! with the same seeded [`ChaCha8Rng`] produces the same images.

use std::fmt;

use derma_core::CHANNELS;
use image::{imageops, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// A single image-to-image step of a [`Compose`] pipeline
pub trait Transform: Send + Sync + fmt::Debug {
    fn apply(&self, image: RgbImage, rng: &mut ChaCha8Rng) -> RgbImage;
}

/// How pixels outside the source image are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingMode {
    /// Fill with black
    Constant,
    /// Mirror around the edge pixel without repeating it
    Reflect,
}

/// Pad an image by `[left, top, right, bottom]` pixels
pub fn pad_image(image: &RgbImage, padding: [u32; 4], mode: PaddingMode) -> RgbImage {
    let [left, top, right, bottom] = padding;
    if padding == [0; 4] {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    ImageBuffer::from_fn(width + left + right, height + top + bottom, |x, y| {
        let sx = x as i64 - left as i64;
        let sy = y as i64 - top as i64;
        match mode {
            PaddingMode::Constant => {
                if sx < 0 || sy < 0 || sx >= width as i64 || sy >= height as i64 {
                    Rgb([0, 0, 0])
                } else {
                    *image.get_pixel(sx as u32, sy as u32)
                }
            }
            PaddingMode::Reflect => *image.get_pixel(reflect(sx, width), reflect(sy, height)),
        }
    })
}

fn reflect(mut index: i64, len: u32) -> u32 {
    let len = len as i64;
    if len <= 1 {
        return 0;
    }
    // Bounce until inside; wide pads may need more than one reflection
    loop {
        if index < 0 {
            index = -index;
        } else if index >= len {
            index = 2 * (len - 1) - index;
        } else {
            return index as u32;
        }
    }
}

/// Constant (zero) padding on all four sides
#[derive(Debug, Clone, Copy)]
pub struct Pad {
    pub amount: u32,
}

impl Pad {
    pub fn new(amount: u32) -> Self {
        Self { amount }
    }
}

impl Transform for Pad {
    fn apply(&self, image: RgbImage, _rng: &mut ChaCha8Rng) -> RgbImage {
        pad_image(&image, [self.amount; 4], PaddingMode::Constant)
    }
}

/// Pad, then cut a `size x size` window at a uniformly random offset
#[derive(Debug, Clone, Copy)]
pub struct RandomCrop {
    pub size: u32,
    pub padding: [u32; 4],
    pub mode: PaddingMode,
}

impl RandomCrop {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            padding: [0; 4],
            mode: PaddingMode::Constant,
        }
    }

    /// Padding as `[left, top, right, bottom]`
    pub fn with_padding(mut self, padding: [u32; 4], mode: PaddingMode) -> Self {
        self.padding = padding;
        self.mode = mode;
        self
    }
}

impl Transform for RandomCrop {
    fn apply(&self, image: RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let mut padded = pad_image(&image, self.padding, self.mode);

        // Inputs smaller than the window get zero-filled up to it
        let (w, h) = padded.dimensions();
        if w < self.size || h < self.size {
            let extra_w = self.size.saturating_sub(w);
            let extra_h = self.size.saturating_sub(h);
            padded = pad_image(&padded, [0, 0, extra_w, extra_h], PaddingMode::Constant);
        }

        let (w, h) = padded.dimensions();
        let x = rng.gen_range(0..=w - self.size);
        let y = rng.gen_range(0..=h - self.size);
        imageops::crop_imm(&padded, x, y, self.size, self.size).to_image()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RandomHorizontalFlip {
    pub probability: f64,
}

impl RandomHorizontalFlip {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }
}

impl Transform for RandomHorizontalFlip {
    fn apply(&self, image: RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        if rng.gen_bool(self.probability) {
            imageops::flip_horizontal(&image)
        } else {
            image
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RandomVerticalFlip {
    pub probability: f64,
}

impl RandomVerticalFlip {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }
}

impl Transform for RandomVerticalFlip {
    fn apply(&self, image: RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        if rng.gen_bool(self.probability) {
            imageops::flip_vertical(&image)
        } else {
            image
        }
    }
}

/// Ordered chain of transforms
#[derive(Debug, Default)]
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Training augmentation: pad 28 -> 32, reflect-padded random crop, random flips
    pub fn training() -> Self {
        Self::new()
            .then(Pad::new(2))
            .then(RandomCrop::new(32).with_padding([0, 0, 5, 5], PaddingMode::Reflect))
            .then(RandomHorizontalFlip::new(0.5))
            .then(RandomVerticalFlip::new(0.5))
    }

    /// Evaluation preprocessing: pad 28 -> 32 only
    pub fn evaluation() -> Self {
        Self::new().then(Pad::new(2))
    }

    pub fn apply(&self, image: RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        self.transforms
            .iter()
            .fold(image, |image, transform| transform.apply(image, rng))
    }
}

/// Convert to channel-major floats in `[0, 1]`
pub fn to_chw(image: &RgbImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut out = vec![0.0f32; CHANNELS * plane];

    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for c in 0..CHANNELS {
            out[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn gradient(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, (x + y) as u8]))
    }

    #[test]
    fn test_pad_grows_image_with_zeros() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let padded = Pad::new(2).apply(gradient(28, 28), &mut rng);

        assert_eq!(padded.dimensions(), (32, 32));
        assert_eq!(padded.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(padded.get_pixel(31, 31).0, [0, 0, 0]);
        assert_eq!(padded.get_pixel(2, 2).0, [0, 0, 0]);
        assert_eq!(padded.get_pixel(5, 3).0, [3, 1, 4]);
    }

    #[test]
    fn test_reflect_padding_excludes_edge() {
        let image = gradient(4, 1);
        let padded = pad_image(&image, [0, 0, 2, 0], PaddingMode::Reflect);

        let xs: Vec<u8> = (0..6).map(|x| padded.get_pixel(x, 0).0[0]).collect();
        assert_eq!(xs, vec![0, 1, 2, 3, 2, 1]);
    }

    #[test]
    fn test_random_crop_output_size() {
        let crop = RandomCrop::new(32).with_padding([0, 0, 5, 5], PaddingMode::Reflect);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..10 {
            assert_eq!(crop.apply(gradient(32, 32), &mut rng).dimensions(), (32, 32));
        }
    }

    #[test]
    fn test_random_crop_small_input_is_filled() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let cropped = RandomCrop::new(8).apply(gradient(5, 5), &mut rng);
        assert_eq!(cropped.dimensions(), (8, 8));
    }

    #[test]
    fn test_flip_probabilities_are_extremes() {
        let image = gradient(4, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let always = RandomHorizontalFlip::new(1.0).apply(image.clone(), &mut rng);
        assert_eq!(always.get_pixel(0, 0).0, image.get_pixel(3, 0).0);

        let never = RandomVerticalFlip::new(0.0).apply(image.clone(), &mut rng);
        assert_eq!(never, image);

        // Out-of-range probabilities are clamped
        assert_eq!(RandomVerticalFlip::new(4.0).probability, 1.0);
    }

    #[test]
    fn test_training_pipeline_is_seed_reproducible() {
        let pipeline = Compose::training();
        assert_eq!(pipeline.len(), 4);

        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..5)
                .map(|_| pipeline.apply(gradient(28, 28), &mut rng))
                .collect::<Vec<_>>()
        };

        let first = run(42);
        assert_eq!(first, run(42));
        assert!(first.iter().all(|img| img.dimensions() == (32, 32)));
    }

    #[test]
    fn test_evaluation_pipeline_is_deterministic() {
        let pipeline = Compose::evaluation();
        let a = pipeline.apply(gradient(28, 28), &mut ChaCha8Rng::seed_from_u64(1));
        let b = pipeline.apply(gradient(28, 28), &mut ChaCha8Rng::seed_from_u64(2));
        assert_eq!(a, b);
    }

    #[test]
    fn test_to_chw_layout_and_scale() {
        let image: RgbImage = ImageBuffer::from_fn(2, 1, |x, _| if x == 0 { Rgb([255, 0, 51]) } else { Rgb([0, 255, 0]) });
        let chw = to_chw(&image);

        assert_eq!(chw.len(), 6);
        assert_eq!(chw[0], 1.0);
        assert_eq!(chw[1], 0.0);
        assert_eq!(chw[3], 1.0);
        assert!((chw[4] - 0.2).abs() < 1e-6);
    }
}
