use crate::config::{FitMode, ModelSpec, PixelNormalization, TensorLayout};
use crate::error::{ClassifierError, Result};
use image::error::{ParameterError, ParameterErrorKind};
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, Rgb, RgbImage};
use ndarray::{Array4, ArrayView4};

/// Fixed-shape model input, batch size 1.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Array4<f32>,
    layout: TensorLayout,
}

impl InputTensor {
    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

/// Brings any decoded image to the square input geometry and value range of one model.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    size: u32,
    fit: FitMode,
    layout: TensorLayout,
    // value = pixel * alpha[c] + beta[c]
    alpha: [f32; 3],
    beta: [f32; 3],
}

impl ImageNormalizer {
    pub fn new(
        size: u32,
        normalization: &PixelNormalization,
        layout: TensorLayout,
        fit: FitMode,
    ) -> Self {
        let (alpha, beta) = match normalization {
            PixelNormalization::SignedUnit => ([1.0 / 127.5; 3], [-1.0; 3]),
            PixelNormalization::UnitRange => ([1.0 / 255.0; 3], [0.0; 3]),
            PixelNormalization::MeanStd { mean, std } => (
                [
                    1.0 / (255.0 * std[0]),
                    1.0 / (255.0 * std[1]),
                    1.0 / (255.0 * std[2]),
                ],
                [-mean[0] / std[0], -mean[1] / std[1], -mean[2] / std[2]],
            ),
        };
        Self {
            size,
            fit,
            layout,
            alpha,
            beta,
        }
    }

    pub fn from_spec(spec: &ModelSpec) -> Self {
        Self::new(
            spec.input_size,
            &spec.normalization,
            spec.layout,
            spec.fit.clone(),
        )
    }

    pub fn input_size(&self) -> u32 {
        self.size
    }

    pub fn normalize(&self, image: &DynamicImage) -> Result<InputTensor> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ClassifierError::ImageDecode {
                context: format!("({}x{})", image.width(), image.height()),
                source: ImageError::Parameter(ParameterError::from_kind(
                    ParameterErrorKind::DimensionMismatch,
                )),
            });
        }
        ensure_rgb_compatible(image)?;

        // Geometry first so the per-pixel work below only touches size x size pixels.
        let rgb = match self.fit {
            FitMode::CenterCrop { crop_pct } => self.center_crop(image, crop_pct),
            FitMode::Pad { fill } => self.pad(image, fill),
        };

        self.to_tensor(rgb)
    }

    /// Equivalent to resizing the short edge to `ceil(size / crop_pct)` and cropping the
    /// centered `size` square, but crops in source coordinates so large inputs are never
    /// upscaled along their long edge.
    fn center_crop(&self, image: &DynamicImage, crop_pct: f32) -> RgbImage {
        let (w, h) = (image.width(), image.height());
        let short = w.min(h);
        let resize_size = (self.size as f32 / crop_pct).ceil();
        let side = ((short as f32 * self.size as f32 / resize_size).round() as u32).clamp(1, short);

        let crop_x = (w - side) / 2;
        let crop_y = (h - side) / 2;
        let cropped = image.crop_imm(crop_x, crop_y, side, side);

        shrink(cropped, self.size)
            .resize_exact(self.size, self.size, FilterType::Triangle)
            .to_rgb8()
    }

    fn pad(&self, image: &DynamicImage, fill: [u8; 3]) -> RgbImage {
        let (w, h) = (image.width(), image.height());
        let scale = self.size as f32 / w.max(h) as f32;
        let new_w = ((w as f32 * scale).round() as u32).clamp(1, self.size);
        let new_h = ((h as f32 * scale).round() as u32).clamp(1, self.size);

        let resized = image
            .resize_exact(new_w, new_h, FilterType::Triangle)
            .to_rgb8();

        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb(fill));
        let offset_x = (self.size - new_w) / 2;
        let offset_y = (self.size - new_h) / 2;
        image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);
        canvas
    }

    fn to_tensor(&self, rgb: RgbImage) -> Result<InputTensor> {
        let size = self.size as usize;
        let hw = size * size;
        let raw = rgb.into_raw();

        let mut interleaved = vec![0f32; 3 * hw];
        for (i, pixel) in raw.chunks_exact(3).enumerate() {
            let off = i * 3;
            for c in 0..3 {
                interleaved[off + c] = pixel[c] as f32 * self.alpha[c] + self.beta[c];
            }
        }

        let data = match self.layout {
            TensorLayout::Nhwc => Array4::from_shape_vec((1, size, size, 3), interleaved),
            TensorLayout::Nchw => {
                // Transpose HWC -> CHW in tiles so the source and all three
                // destination planes stay in cache.
                let mut planar = vec![0f32; 3 * hw];
                const TILE: usize = 1024;
                for base in (0..hw).step_by(TILE) {
                    let end = (base + TILE).min(hw);
                    for i in base..end {
                        let src = i * 3;
                        planar[i] = interleaved[src];
                        planar[hw + i] = interleaved[src + 1];
                        planar[2 * hw + i] = interleaved[src + 2];
                    }
                }
                Array4::from_shape_vec((1, 3, size, size), planar)
            }
        }
        .map_err(|e| ClassifierError::inference(format!("failed to create tensor: {e}")))?;

        Ok(InputTensor {
            data,
            layout: self.layout,
        })
    }
}

/// Cheap nearest-neighbour pass for very large crops before the filtered resize.
fn shrink(image: DynamicImage, target: u32) -> DynamicImage {
    let intermediate = target * 4;
    if image.width() > intermediate * 2 || image.height() > intermediate * 2 {
        image.resize_exact(intermediate, intermediate, FilterType::Nearest)
    } else {
        image
    }
}

fn ensure_rgb_compatible(image: &DynamicImage) -> Result<()> {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_)
        | DynamicImage::ImageRgb32F(_)
        | DynamicImage::ImageRgba32F(_) => Ok(()),
        other => Err(ClassifierError::UnsupportedFormat {
            format: format!("{:?}", other.color()),
        }),
    }
}
