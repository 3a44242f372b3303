use crate::core::detector::FaceBox;
use image::{DynamicImage, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// Draws every detection onto a copy of the frame. The box the pipeline
/// would embed (the first one) gets a double border.
pub fn annotate_faces(frame: &DynamicImage, faces: &[FaceBox]) -> DynamicImage {
    let mut img = frame.to_rgb8();

    let high_conf_color = Rgb([0u8, 255u8, 0u8]);
    let med_conf_color = Rgb([255u8, 255u8, 0u8]);
    let low_conf_color = Rgb([255u8, 0u8, 0u8]);

    for (i, face) in faces.iter().enumerate() {
        if face.width() <= 0.0 || face.height() <= 0.0 {
            continue;
        }

        let color = if face.confidence > 0.7 {
            high_conf_color
        } else if face.confidence > 0.5 {
            med_conf_color
        } else {
            low_conf_color
        };

        let x1 = face.x1.max(0.0) as i32;
        let y1 = face.y1.max(0.0) as i32;
        let x2 = face.x2.min(img.width() as f32) as i32;
        let y2 = face.y2.min(img.height() as f32) as i32;

        let rect_width = (x2 - x1).max(1) as u32;
        let rect_height = (y2 - y1).max(1) as u32;

        draw_hollow_rect_mut(&mut img, Rect::at(x1, y1).of_size(rect_width, rect_height), color);

        if i == 0 && rect_width > 2 && rect_height > 2 {
            let inner = Rect::at(x1 + 1, y1 + 1).of_size(rect_width - 2, rect_height - 2);
            draw_hollow_rect_mut(&mut img, inner, color);
        }
    }

    DynamicImage::ImageRgb8(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn draws_box_edges() {
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, Luma([0])));
        let face = FaceBox { x1: 2.0, y1: 2.0, x2: 12.0, y2: 12.0, confidence: 0.9 };

        let out = annotate_faces(&frame, &[face]).to_rgb8();
        assert_eq!(out.get_pixel(2, 2), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(3, 3), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(7, 7), &Rgb([0, 0, 0]));
    }

    #[test]
    fn skips_degenerate_boxes() {
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([0])));
        let face = FaceBox { x1: 5.0, y1: 5.0, x2: 5.0, y2: 6.0, confidence: 0.9 };

        let out = annotate_faces(&frame, &[face]).to_rgb8();
        assert!(out.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }
}
