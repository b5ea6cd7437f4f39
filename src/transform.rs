//! Transformation steps
//!
//! Each step is a pure bytes-in/bytes-out unit delegating to an external
//! backend: `lightningcss` for stylesheets, `oxc` for scripts, `image` for
//! raster re-encoding. Steps carry their own parameters and are instantiated
//! once at registry construction; bad parameters fail there, bad input fails
//! per file at run time.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use crate::config::{StepConfig, StepKind};
use crate::error::{Error, StepError};

/// One stage of a category's pipeline: bytes in, bytes out.
pub trait TransformStep: Send + Sync {
    /// Step name for diagnostics
    fn name(&self) -> &'static str;

    /// Apply the transformation to one file's contents
    fn apply(&self, input: &[u8]) -> Result<Vec<u8>, StepError>;
}

/// Instantiate the ordered step pipeline for a category.
///
/// Parameter validation (browser target queries, etc.) happens here so a bad
/// configuration fails before any task runs.
pub fn build_steps(
    category: &str,
    specs: &[crate::config::StepSpec],
) -> Result<Vec<Box<dyn TransformStep>>, Error> {
    let mut steps: Vec<Box<dyn TransformStep>> = Vec::with_capacity(specs.len());

    for spec in specs {
        let spec = spec.config();
        match spec.kind {
            StepKind::Prefix => steps.push(Box::new(Prefix::from_config(category, &spec)?)),
            StepKind::MinifyCss => steps.push(Box::new(MinifyCss)),
            StepKind::MinifyJs => steps.push(Box::new(MinifyJs)),
            StepKind::OptimizeImage => steps.push(Box::new(OptimizeImage {
                quality: spec.quality.unwrap_or(80),
            })),
            StepKind::Copy => steps.push(Box::new(Copy)),
        }
    }

    Ok(steps)
}

/// Lower a stylesheet for a browser target list, adding vendor prefixes.
///
/// Must run before [`MinifyCss`] so prefixed declarations are part of what
/// gets minified.
pub struct Prefix {
    targets: Targets,
}

impl Prefix {
    fn from_config(category: &str, spec: &StepConfig) -> Result<Self, Error> {
        let queries: Vec<&str> = if spec.targets.is_empty() {
            vec!["defaults"]
        } else {
            spec.targets.iter().map(|s| s.as_str()).collect()
        };

        let browsers = Browsers::from_browserslist(queries)
            .map_err(|e| Error::InvalidTargets {
                category: category.to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| Error::InvalidTargets {
                category: category.to_string(),
                reason: "query resolved to an empty browser set".to_string(),
            })?;

        Ok(Self {
            targets: Targets::from(browsers),
        })
    }
}

impl TransformStep for Prefix {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn apply(&self, input: &[u8]) -> Result<Vec<u8>, StepError> {
        let source = std::str::from_utf8(input).map_err(|_| StepError::NotUtf8)?;

        let mut sheet = StyleSheet::parse(source, ParserOptions::default())
            .map_err(|e| StepError::Stylesheet(e.to_string()))?;
        sheet
            .minify(MinifyOptions {
                targets: self.targets,
                ..MinifyOptions::default()
            })
            .map_err(|e| StepError::Stylesheet(e.to_string()))?;
        let out = sheet
            .to_css(PrinterOptions {
                targets: self.targets,
                ..PrinterOptions::default()
            })
            .map_err(|e| StepError::Stylesheet(e.to_string()))?;

        Ok(out.code.into_bytes())
    }
}

/// Minify a stylesheet
pub struct MinifyCss;

impl TransformStep for MinifyCss {
    fn name(&self) -> &'static str {
        "minify-css"
    }

    fn apply(&self, input: &[u8]) -> Result<Vec<u8>, StepError> {
        let source = std::str::from_utf8(input).map_err(|_| StepError::NotUtf8)?;

        let mut sheet = StyleSheet::parse(source, ParserOptions::default())
            .map_err(|e| StepError::Stylesheet(e.to_string()))?;
        sheet
            .minify(MinifyOptions::default())
            .map_err(|e| StepError::Stylesheet(e.to_string()))?;
        let out = sheet
            .to_css(PrinterOptions {
                minify: true,
                ..PrinterOptions::default()
            })
            .map_err(|e| StepError::Stylesheet(e.to_string()))?;

        Ok(out.code.into_bytes())
    }
}

/// Minify a script
pub struct MinifyJs;

impl TransformStep for MinifyJs {
    fn name(&self) -> &'static str {
        "minify-js"
    }

    fn apply(&self, input: &[u8]) -> Result<Vec<u8>, StepError> {
        let source = std::str::from_utf8(input).map_err(|_| StepError::NotUtf8)?;

        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
        if !parsed.errors.is_empty() {
            let detail = parsed
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(StepError::Script(detail));
        }

        let mut program = parsed.program;
        let minified = Minifier::new(MinifierOptions {
            mangle: Some(MangleOptions::default()),
            compress: Some(CompressOptions::smallest()),
        })
        .minify(&allocator, &mut program);

        let code = Codegen::new()
            .with_options(CodegenOptions {
                minify: true,
                comments: CommentOptions::disabled(),
                ..CodegenOptions::default()
            })
            .with_scoping(minified.scoping)
            .build(&program)
            .code;

        Ok(code.into_bytes())
    }
}

/// Re-encode a raster image at the configured quality.
///
/// PNG is re-encoded with the strongest compression, JPEG at `quality`.
/// Formats without an enabled lossy encoder (GIF, WebP) pass through
/// untouched; the re-encoded bytes are only kept when they are smaller than
/// the input.
pub struct OptimizeImage {
    quality: u8,
}

impl TransformStep for OptimizeImage {
    fn name(&self) -> &'static str {
        "optimize-image"
    }

    fn apply(&self, input: &[u8]) -> Result<Vec<u8>, StepError> {
        use image::codecs::jpeg::JpegEncoder;
        use image::codecs::png::{CompressionType, FilterType, PngEncoder};
        use image::ImageFormat;

        let format = image::guess_format(input).map_err(|e| StepError::Image(e.to_string()))?;

        let out = match format {
            ImageFormat::Png => {
                let img = image::load_from_memory_with_format(input, format)
                    .map_err(|e| StepError::Image(e.to_string()))?;
                let mut out = Vec::new();
                let encoder = PngEncoder::new_with_quality(
                    &mut out,
                    CompressionType::Best,
                    FilterType::Adaptive,
                );
                img.write_with_encoder(encoder)
                    .map_err(|e| StepError::Image(e.to_string()))?;
                out
            }
            ImageFormat::Jpeg => {
                let img = image::load_from_memory_with_format(input, format)
                    .map_err(|e| StepError::Image(e.to_string()))?;
                let mut out = Vec::new();
                let encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
                img.write_with_encoder(encoder)
                    .map_err(|e| StepError::Image(e.to_string()))?;
                out
            }
            _ => return Ok(input.to_vec()),
        };

        if out.len() < input.len() {
            Ok(out)
        } else {
            Ok(input.to_vec())
        }
    }
}

/// Passthrough copy
pub struct Copy;

impl TransformStep for Copy {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn apply(&self, input: &[u8]) -> Result<Vec<u8>, StepError> {
        Ok(input.to_vec())
    }
}
