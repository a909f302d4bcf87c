//! Decoding and per-model tensor preparation.
//!
//! Every model takes a single NHWC batch `(1, height, width, 3)` scaled to
//! `[0, 1]`. What differs per model is the target size and the channel order
//! the network was trained on.

use crate::model::ModelKind;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

#[derive(thiserror::Error, Debug)]
pub enum PreprocessError {
    #[error("Unsupported image format. Use JPEG or PNG")]
    Decode(#[source] image::ImageError),
    #[error("Image has zero width or height")]
    EmptyImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessSpec {
    pub width: u32,
    pub height: u32,
    pub channel_order: ChannelOrder,
}

impl PreprocessSpec {
    /// Only the soil model was trained on RGB input; plant and pest saw the
    /// decoder's BGR order and keep receiving it.
    pub fn for_kind(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Soil => Self {
                width: 150,
                height: 150,
                channel_order: ChannelOrder::Rgb,
            },
            ModelKind::Plant => Self {
                width: 224,
                height: 224,
                channel_order: ChannelOrder::Bgr,
            },
            ModelKind::Pest => Self {
                width: 150,
                height: 150,
                channel_order: ChannelOrder::Bgr,
            },
        }
    }

    pub fn tensor_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }
}

pub fn decode(image_bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    let image = image::load_from_memory(image_bytes).map_err(PreprocessError::Decode)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(PreprocessError::EmptyImage);
    }
    Ok(image)
}

/// Decodes `image_bytes` and builds the input batch for `kind`.
pub fn prepare(image_bytes: &[u8], kind: ModelKind) -> Result<Array4<f32>, PreprocessError> {
    let image = decode(image_bytes)?;
    Ok(to_tensor(&image, &PreprocessSpec::for_kind(kind)))
}

pub fn to_tensor(image: &DynamicImage, spec: &PreprocessSpec) -> Array4<f32> {
    let resized = image.resize_exact(spec.width, spec.height, FilterType::Triangle);
    let rgb_image = resized.to_rgb8();

    let mut array = Array4::<f32>::zeros(spec.tensor_shape());
    for (x, y, pixel) in rgb_image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let channels = match spec.channel_order {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        };
        for (c, value) in channels.into_iter().enumerate() {
            array[[0, y as usize, x as usize, c]] = value as f32 / 255.0;
        }
    }
    array
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    pub(crate) fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 200])
        });
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut bytes, format)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn output_shape_matches_each_model() {
        let png = encoded_image(64, 40, ImageFormat::Png);
        assert_eq!(prepare(&png, ModelKind::Soil).unwrap().shape(), &[1, 150, 150, 3]);
        assert_eq!(prepare(&png, ModelKind::Plant).unwrap().shape(), &[1, 224, 224, 3]);
        assert_eq!(prepare(&png, ModelKind::Pest).unwrap().shape(), &[1, 150, 150, 3]);
    }

    #[test]
    fn pixel_values_are_unit_scaled() {
        let jpeg = encoded_image(300, 200, ImageFormat::Jpeg);
        let tensor = prepare(&jpeg, ModelKind::Plant).unwrap();
        assert!(tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn only_soil_keeps_rgb_order() {
        let solid = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 51])));

        let soil = to_tensor(&solid, &PreprocessSpec::for_kind(ModelKind::Soil));
        assert_eq!(soil[[0, 10, 10, 0]], 1.0);
        assert_eq!(soil[[0, 10, 10, 2]], 0.2);

        let pest = to_tensor(&solid, &PreprocessSpec::for_kind(ModelKind::Pest));
        assert_eq!(pest[[0, 10, 10, 0]], 0.2);
        assert_eq!(pest[[0, 10, 10, 2]], 1.0);
    }

    #[test]
    fn corrupted_bytes_fail_to_decode() {
        let mut bytes = encoded_image(16, 16, ImageFormat::Jpeg);
        bytes.truncate(10);
        assert!(matches!(
            prepare(&bytes, ModelKind::Soil),
            Err(PreprocessError::Decode(_))
        ));
        assert!(prepare(b"definitely not an image", ModelKind::Pest).is_err());
    }
}
