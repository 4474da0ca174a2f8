//! Conversions performed in process. All functions here block and are meant
//! to run under `spawn_blocking`.

use flate2::{Compression, write::GzEncoder};
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::errors::{ConversionError, ConversionResult};
use crate::models::Format;

/// Rewrite a tab-separated file as RFC 4180 CSV.
pub fn tsv_to_csv(input: &Path, output: &Path) -> ConversionResult<()> {
    let contents = std::fs::read(input)?;
    let contents = String::from_utf8_lossy(&contents);
    let mut writer = BufWriter::new(File::create(output)?);

    for line in contents.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let mut first = true;
        for field in line.split('\t') {
            if !first {
                writer.write_all(b",")?;
            }
            first = false;
            write_csv_field(&mut writer, field)?;
        }
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    Ok(())
}

fn write_csv_field<W: Write>(writer: &mut W, field: &str) -> std::io::Result<()> {
    if field.contains([',', '"', '\n', '\r']) {
        write!(writer, "\"{}\"", field.replace('"', "\"\""))
    } else {
        writer.write_all(field.as_bytes())
    }
}

/// Extract a zip archive into `destination`.
///
/// Entries whose names would escape `destination` are rejected by the zip
/// reader.
pub fn extract_zip(archive: &Path, destination: &Path) -> ConversionResult<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| ConversionError::library("zip", e))?;
    zip.extract(destination)
        .map_err(|e| ConversionError::library("zip", e))?;
    Ok(())
}

/// Repack the contents of `dir` as a gzip-compressed tarball at `output`.
pub fn tar_gz_directory(dir: &Path, output: &Path) -> ConversionResult<()> {
    let encoder = GzEncoder::new(File::create(output)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir)?;
    builder.into_inner()?.finish()?.sync_all()?;
    Ok(())
}

/// Decode `input` and re-encode it as `target` (png or jpg).
pub fn transcode_image(input: &Path, output: &Path, target: &Format) -> ConversionResult<()> {
    let image = image::open(input).map_err(|e| ConversionError::library("image", e))?;

    let (image, format) = match target.as_str() {
        // JPEG has no alpha channel
        "jpg" | "jpeg" => (DynamicImage::ImageRgb8(image.to_rgb8()), ImageFormat::Jpeg),
        "png" => (image, ImageFormat::Png),
        other => {
            return Err(ConversionError::library(
                "image",
                format!("unsupported target format '{other}'"),
            ));
        }
    };

    image
        .save_with_format(output, format)
        .map_err(|e| ConversionError::library("image", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, contents) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_tsv_to_csv_quotes_fields() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("in.tsv");
        let output = temp_dir.path().join("out.csv");
        std::fs::write(&input, "name\tnote\r\nalice\thello, world\nbob\tsays \"hi\"\n").unwrap();

        tsv_to_csv(&input, &output).unwrap();

        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "name,note\nalice,\"hello, world\"\nbob,\"says \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn test_tsv_to_csv_keeps_empty_fields() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("in.tsv");
        let output = temp_dir.path().join("out.csv");
        std::fs::write(&input, "a\t\tc").unwrap();

        tsv_to_csv(&input, &output).unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "a,,c\n");
    }

    #[test]
    fn test_zip_to_tar_gz() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive = temp_dir.path().join("in.zip");
        let extracted = temp_dir.path().join("extracted");
        let output = temp_dir.path().join("out.tar.gz");
        write_zip(&archive, &[("a.txt", "alpha"), ("docs/b.txt", "beta")]);

        extract_zip(&archive, &extracted).unwrap();
        tar_gz_directory(&extracted, &output).unwrap();

        let decoder = flate2::read::GzDecoder::new(File::open(&output).unwrap());
        let mut tarball = tar::Archive::new(decoder);
        let mut found = Vec::new();
        for entry in tarball.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.header().entry_type().is_file() {
                let path = entry.path().unwrap().to_string_lossy().into_owned();
                let path = path.trim_start_matches("./").to_string();
                let mut contents = String::new();
                entry.read_to_string(&mut contents).unwrap();
                found.push((path, contents));
            }
        }
        found.sort();

        assert_eq!(
            found,
            vec![
                ("a.txt".to_string(), "alpha".to_string()),
                ("docs/b.txt".to_string(), "beta".to_string()),
            ]
        );
    }

    #[test]
    fn test_extract_zip_rejects_garbage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let archive = temp_dir.path().join("broken.zip");
        std::fs::write(&archive, "definitely not a zip").unwrap();

        let result = extract_zip(&archive, &temp_dir.path().join("out"));
        assert!(matches!(result, Err(ConversionError::Library { .. })));
    }

    #[test]
    fn test_transcode_image_to_jpg_and_png() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("in.png");
        let pixels = image::RgbaImage::from_pixel(4, 4, image::Rgba([200, 10, 10, 128]));
        pixels.save(&input).unwrap();

        let jpg = temp_dir.path().join("out.jpg");
        transcode_image(&input, &jpg, &Format::parse("jpg").unwrap()).unwrap();
        let decoded = image::open(&jpg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
        assert!(!decoded.color().has_alpha());

        let png = temp_dir.path().join("out.png");
        transcode_image(&input, &png, &Format::parse("png").unwrap()).unwrap();
        assert!(image::open(&png).unwrap().color().has_alpha());
    }

    #[test]
    fn test_transcode_image_rejects_unknown_target() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("in.png");
        image::RgbImage::new(2, 2).save(&input).unwrap();

        let result = transcode_image(
            &input,
            &temp_dir.path().join("out.bmp"),
            &Format::parse("bmp").unwrap(),
        );
        assert!(result.is_err());
    }
}
