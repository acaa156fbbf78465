//! Per-option setters
//!
//! Each setter parses and validates all of its arguments first and only then
//! writes, so a rejected instruction leaves the options untouched.

use super::{
    Field, Gravity, GravityType, ImageType, Instruction, OptionName, Precedence,
    ProcessingOptions, ResizeType, Rgb, WatermarkOptions,
};
use crate::constants::MAX_QUALITY;
use crate::error::ProcessingError;

type Result<T> = std::result::Result<T, ProcessingError>;

impl ProcessingOptions {
    /// Apply one non-preset instruction at `level`
    pub fn apply(&mut self, instruction: &Instruction, level: Precedence) -> Result<()> {
        let option = instruction.option()?;
        let args: Vec<&str> = instruction.args.iter().map(String::as_str).collect();

        match option {
            OptionName::Resize => self.set_resize(&args, level),
            OptionName::Size => self.set_size(&args, level),
            OptionName::ResizingType => self.set_resizing_type(&args, level),
            OptionName::Width => self.set_width(&args, level),
            OptionName::Height => self.set_height(&args, level),
            OptionName::Gravity => self.set_gravity(&args, level),
            OptionName::Enlarge => self.set_enlarge(&args, level),
            OptionName::Format => self.set_format(&args, level),
            OptionName::Quality => self.set_quality(&args, level),
            OptionName::Background => self.set_background(&args, level),
            OptionName::Blur => self.set_blur(&args, level),
            OptionName::Sharpen => self.set_sharpen(&args, level),
            OptionName::Dpr => self.set_dpr(&args, level),
            OptionName::Watermark => self.set_watermark(&args, level),
            OptionName::CacheBuster => self.set_cache_buster(&args, level),
            OptionName::Preset => Err(ProcessingError::invalid_arg(
                option.as_str(),
                "presets are expanded before options are applied",
            )),
        }
    }

    fn set_resize(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        let option = OptionName::Resize;
        check_arity(option, args, 1, 4)?;

        let resize = non_empty(args.first()).map(parse_resize_type).transpose()?;
        let (width, height, enlarge) = parse_size_args(option, &args[1..])?;

        if let Some(resize) = resize {
            self.assign(Field::Resize, level, |po| po.resize = resize);
        }
        self.write_size(width, height, enlarge, level);
        Ok(())
    }

    fn set_size(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        let option = OptionName::Size;
        check_arity(option, args, 1, 3)?;

        let (width, height, enlarge) = parse_size_args(option, args)?;
        self.write_size(width, height, enlarge, level);
        Ok(())
    }

    fn write_size(
        &mut self,
        width: Option<u32>,
        height: Option<u32>,
        enlarge: Option<bool>,
        level: Precedence,
    ) {
        if let Some(width) = width {
            self.assign(Field::Width, level, |po| po.width = width);
        }
        if let Some(height) = height {
            self.assign(Field::Height, level, |po| po.height = height);
        }
        if let Some(enlarge) = enlarge {
            self.assign(Field::Enlarge, level, |po| po.enlarge = enlarge);
        }
    }

    fn set_resizing_type(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        check_arity(OptionName::ResizingType, args, 1, 1)?;
        let resize = parse_resize_type(args[0])?;
        self.assign(Field::Resize, level, |po| po.resize = resize);
        Ok(())
    }

    fn set_width(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        check_arity(OptionName::Width, args, 1, 1)?;
        let width = parse_dimension(OptionName::Width, args[0])?;
        self.assign(Field::Width, level, |po| po.width = width);
        Ok(())
    }

    fn set_height(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        check_arity(OptionName::Height, args, 1, 1)?;
        let height = parse_dimension(OptionName::Height, args[0])?;
        self.assign(Field::Height, level, |po| po.height = height);
        Ok(())
    }

    fn set_gravity(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        let option = OptionName::Gravity;
        check_arity(option, args, 1, 3)?;

        let kind: GravityType = args[0].parse()?;
        let gravity = if kind == GravityType::FocusPoint {
            if args.len() != 3 {
                return Err(ProcessingError::invalid_arg(
                    option.as_str(),
                    "focus point gravity needs x and y",
                ));
            }
            let x = parse_unit_interval(option, args[1])?;
            let y = parse_unit_interval(option, args[2])?;
            Gravity::focus_point(x, y)
        } else {
            if args.len() > 1 {
                return Err(ProcessingError::invalid_arg(
                    option.as_str(),
                    format!("'{}' takes no coordinates", args[0]),
                ));
            }
            Gravity::new(kind)
        };

        self.assign(Field::Gravity, level, |po| po.gravity = gravity);
        Ok(())
    }

    fn set_enlarge(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        check_arity(OptionName::Enlarge, args, 1, 1)?;
        let enlarge = parse_bool(OptionName::Enlarge, args[0])?;
        self.assign(Field::Enlarge, level, |po| po.enlarge = enlarge);
        Ok(())
    }

    fn set_format(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        check_arity(OptionName::Format, args, 1, 1)?;
        let format: ImageType = args[0].parse()?;
        self.assign(Field::Format, level, |po| po.format = Some(format));
        Ok(())
    }

    fn set_quality(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        let option = OptionName::Quality;
        check_arity(option, args, 1, 1)?;

        let quality = args[0]
            .parse::<u8>()
            .ok()
            .filter(|q| *q <= MAX_QUALITY)
            .ok_or_else(|| {
                ProcessingError::invalid_arg(
                    option.as_str(),
                    format!("'{}' is not a quality between 0 and {}", args[0], MAX_QUALITY),
                )
            })?;

        self.assign(Field::Quality, level, |po| po.quality = quality);
        Ok(())
    }

    fn set_background(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        let option = OptionName::Background;

        let background = match args {
            [] | [""] => None,
            [hex] => Some(Rgb::from_hex(hex).ok_or_else(|| {
                ProcessingError::invalid_arg(
                    option.as_str(),
                    format!("'{}' is not an RRGGBB color", hex),
                )
            })?),
            [r, g, b] => Some(Rgb::new(
                parse_channel(r)?,
                parse_channel(g)?,
                parse_channel(b)?,
            )),
            _ => {
                return Err(ProcessingError::invalid_arg(
                    option.as_str(),
                    format!("expected a hex color or R:G:B, got {} arguments", args.len()),
                ))
            }
        };

        self.assign(Field::Background, level, |po| match background {
            Some(color) => {
                po.background = color;
                po.flatten = true;
            }
            None => po.flatten = false,
        });
        Ok(())
    }

    fn set_blur(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        check_arity(OptionName::Blur, args, 1, 1)?;
        let sigma = parse_non_negative(OptionName::Blur, args[0])?;
        self.assign(Field::Blur, level, |po| po.blur = sigma);
        Ok(())
    }

    fn set_sharpen(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        check_arity(OptionName::Sharpen, args, 1, 1)?;
        let sigma = parse_non_negative(OptionName::Sharpen, args[0])?;
        self.assign(Field::Sharpen, level, |po| po.sharpen = sigma);
        Ok(())
    }

    fn set_dpr(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        let option = OptionName::Dpr;
        check_arity(option, args, 1, 1)?;

        let dpr = args[0]
            .parse::<f64>()
            .ok()
            .filter(|dpr| dpr.is_finite() && *dpr > 0.0)
            .ok_or_else(|| {
                ProcessingError::invalid_arg(
                    option.as_str(),
                    format!("'{}' is not a positive number", args[0]),
                )
            })?;

        self.assign(Field::Dpr, level, |po| po.dpr = dpr);
        Ok(())
    }

    fn set_watermark(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        let option = OptionName::Watermark;
        check_arity(option, args, 1, 5)?;

        let opacity = parse_unit_interval(option, args[0])?;
        let mut watermark = WatermarkOptions {
            enabled: opacity > 0.0,
            opacity,
            ..WatermarkOptions::default()
        };

        if let Some(gravity) = non_empty(args.get(1)) {
            let gravity: GravityType = gravity.parse()?;
            if matches!(gravity, GravityType::FocusPoint | GravityType::Smart) {
                return Err(ProcessingError::invalid_arg(
                    option.as_str(),
                    format!("gravity '{}' cannot place a watermark", args[1]),
                ));
            }
            watermark.gravity = gravity;
        }
        if let Some(x) = non_empty(args.get(2)) {
            watermark.offset_x = parse_offset(x)?;
        }
        if let Some(y) = non_empty(args.get(3)) {
            watermark.offset_y = parse_offset(y)?;
        }
        if let Some(scale) = non_empty(args.get(4)) {
            watermark.scale = scale
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite() && *s >= 0.0)
                .ok_or_else(|| {
                    ProcessingError::invalid_arg(
                        option.as_str(),
                        format!("'{}' is not a non-negative scale", scale),
                    )
                })?;
        }

        self.assign(Field::Watermark, level, |po| po.watermark = watermark);
        Ok(())
    }

    fn set_cache_buster(&mut self, args: &[&str], level: Precedence) -> Result<()> {
        check_arity(OptionName::CacheBuster, args, 1, 1)?;
        let buster = args[0].to_string();
        self.assign(Field::CacheBuster, level, |po| po.cache_buster = buster);
        Ok(())
    }
}

fn check_arity(option: OptionName, args: &[&str], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(ProcessingError::invalid_arg(
            option.as_str(),
            format!("expected {} arguments, got {}", expected, args.len()),
        ));
    }
    Ok(())
}

fn non_empty<'a>(arg: Option<&&'a str>) -> Option<&'a str> {
    arg.copied().filter(|arg| !arg.is_empty())
}

fn parse_resize_type(value: &str) -> Result<ResizeType> {
    value.parse()
}

/// `width[:height[:enlarge]]`, empty components skipped
fn parse_size_args(
    option: OptionName,
    args: &[&str],
) -> Result<(Option<u32>, Option<u32>, Option<bool>)> {
    let width = non_empty(args.first())
        .map(|w| parse_dimension(option, w))
        .transpose()?;
    let height = non_empty(args.get(1))
        .map(|h| parse_dimension(option, h))
        .transpose()?;
    let enlarge = non_empty(args.get(2))
        .map(|e| parse_bool(option, e))
        .transpose()?;
    Ok((width, height, enlarge))
}

fn parse_dimension(option: OptionName, value: &str) -> Result<u32> {
    value.parse::<u32>().map_err(|_| {
        ProcessingError::invalid_arg(
            option.as_str(),
            format!("'{}' is not a non-negative integer", value),
        )
    })
}

/// Accepts `1/0/t/f/true/false`, case-insensitive
pub(crate) fn parse_bool(option: OptionName, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(ProcessingError::invalid_arg(
            option.as_str(),
            format!("'{}' is not a boolean", value),
        )),
    }
}

fn parse_unit_interval(option: OptionName, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| (0.0..=1.0).contains(v))
        .ok_or_else(|| {
            ProcessingError::invalid_arg(
                option.as_str(),
                format!("'{}' is not a number between 0 and 1", value),
            )
        })
}

fn parse_non_negative(option: OptionName, value: &str) -> Result<f32> {
    value
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| {
            ProcessingError::invalid_arg(
                option.as_str(),
                format!("'{}' is not a non-negative number", value),
            )
        })
}

fn parse_channel(value: &str) -> Result<u8> {
    value.parse::<u8>().map_err(|_| {
        ProcessingError::invalid_arg(
            OptionName::Background.as_str(),
            format!("'{}' is not a color channel between 0 and 255", value),
        )
    })
}

fn parse_offset(value: &str) -> Result<i32> {
    value.parse::<i32>().map_err(|_| {
        ProcessingError::invalid_arg(
            OptionName::Watermark.as_str(),
            format!("'{}' is not an integer offset", value),
        )
    })
}
