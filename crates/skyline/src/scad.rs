//! OpenSCAD program emission.
//!
//! The output is a pure function of the [`Skyline`]: parameters first, then
//! the `base` and `building` modules, then one `union()` instantiating the
//! base and every building with a positive count. Building heights are
//! re-derived inside the program from `maxContributions`, so the file can be
//! rendered without this crate.

use crate::atomic::atomic_write;
use crate::error::{Result, SkylineError};
use crate::layout::Skyline;
use log::{info, warn};
use std::fmt::Write;
use std::path::Path;
use std::time::Instant;

pub const BASE_COLOR: &str = "cyan";
pub const BUILDING_COLOR: &str = "red";
pub const TEXT_COLOR: &str = "red";
/// Extrusion depth of the label text, in mm.
pub const TEXT_HEIGHT: f64 = 0.4;

const BASE_MODULE: &str = r#"module base() {
    bottomWidth = baseWidth + 2 * baseOffset;
    bottomLength = baseLength + 2 * baseOffset;

    points = [
        // Bottom
        [0, 0, 0],
        [bottomWidth, 0, 0],
        [bottomWidth, bottomLength, 0],
        [0, bottomLength, 0],
        // Top
        [baseOffset, baseOffset, baseHeight],
        [baseWidth + baseOffset, baseOffset, baseHeight],
        [baseWidth + baseOffset, baseLength + baseOffset, baseHeight],
        [baseOffset, baseLength + baseOffset, baseHeight],
    ];

    faces = [
        [0, 1, 2, 3], // Bottom
        [4, 5, 1, 0], // Front
        [7, 6, 5, 4], // Top
        [5, 6, 2, 1], // Right
        [6, 7, 3, 2], // Back
        [7, 4, 0, 3], // Left
    ];

    color(baseColor)
        polyhedron(points, faces);

    if (textEnable) {
        textOffset = baseOffset + baseMargin;
        textSize = baseHeight - baseMargin;

        // Front face
        color(textColor)
            rotate([90 - baseAngle, 0, 0])
                translate([textOffset, 1, 0])
                    linear_extrude(textHeight)
                        text(textLeft, size = textSize, halign = "left", valign = "baseline", font = textFont);

        color(textColor)
            rotate([90 - baseAngle, 0, 0])
                translate([bottomWidth - textOffset, 1, 0])
                    linear_extrude(textHeight)
                        text(textRight, size = textSize, halign = "right", valign = "baseline", font = textFont);

        // Back face
        color(textColor)
            translate([bottomWidth, bottomLength, 0])
                rotate([0, 0, 180])
                    rotate([90 - baseAngle, 0, 0])
                        translate([bottomWidth / 2, 1, 0])
                            linear_extrude(textHeight)
                                text(str(textLeft, " ", textRight), size = textSize, halign = "center", valign = "baseline", font = textFont);
    }
}"#;

const BUILDING_MODULE: &str = r#"module building(row, col, contributions) {
    height = contributions / maxContributions * maxBuildingHeight;
    color(buildingColor)
        translate([
            (col * buildingWidth) + baseMargin + baseOffset,
            (row * buildingLength) + baseMargin + baseOffset,
            baseHeight
        ])
            cube([buildingWidth, buildingLength, height]);
}"#;

/// Options for persisting the program.
#[derive(Debug, Clone, Copy)]
pub struct EmitOptions {
    /// Write a base-only program when no building has a positive count
    /// instead of failing with `EmptyModel`.
    pub allow_empty_model: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            allow_empty_model: true,
        }
    }
}

/// Fixed-point with 6 decimals, used for every real number in the output.
fn num(v: f64) -> String {
    format!("{v:.6}")
}

/// Double-quoted OpenSCAD string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Renders the skyline as an OpenSCAD program.
///
/// Buildings with a zero count are skipped; if none remain the program
/// contains only the base.
pub fn emit(skyline: &Skyline) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_program(&mut out, skyline);

    if skyline.is_empty_model() {
        warn!("No building has a positive count; emitting base only");
    }
    out
}

fn write_program(out: &mut String, sl: &Skyline) -> std::fmt::Result {
    writeln!(out, "// Contribution Skyline")?;
    writeln!(out, "// generated by skyline {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out)?;

    writeln!(out, "// Base Parameters")?;
    writeln!(out, "baseMargin = {};", num(sl.base.margin))?;
    writeln!(out, "baseAngle = {};", num(sl.base.angle))?;
    writeln!(out, "baseHeight = {};", num(sl.base.height))?;
    writeln!(out, "baseWidth = {} + (2 * baseMargin);", num(sl.bounds.width))?;
    writeln!(out, "baseLength = {} + (2 * baseMargin);", num(sl.bounds.length))?;
    writeln!(out, "baseOffset = baseHeight * tan(baseAngle);")?;
    writeln!(out, "baseColor = {};", quote(BASE_COLOR))?;

    let text_enable = !(sl.left_label.is_empty() && sl.right_label.is_empty());
    writeln!(out)?;
    writeln!(out, "// Base Text")?;
    writeln!(out, "textEnable = {text_enable};")?;
    writeln!(out, "textFont = {};", quote(&sl.font))?;
    writeln!(out, "textLeft = {};", quote(&sl.left_label))?;
    writeln!(out, "textRight = {};", quote(&sl.right_label))?;
    writeln!(out, "textColor = {};", quote(TEXT_COLOR))?;
    writeln!(out, "textHeight = {};", num(TEXT_HEIGHT))?;

    writeln!(out)?;
    writeln!(out, "// Building Parameters")?;
    writeln!(out, "buildingWidth = {};", num(sl.building_width))?;
    writeln!(out, "buildingLength = {};", num(sl.building_length))?;
    writeln!(out, "maxBuildingHeight = {};", num(sl.max_building_height))?;
    writeln!(out, "buildingColor = {};", quote(BUILDING_COLOR))?;

    writeln!(out)?;
    writeln!(out, "// Contribution Parameters")?;
    writeln!(out, "maxContributions = {};", sl.max_count)?;
    writeln!(out)?;

    writeln!(out, "{BASE_MODULE}")?;
    writeln!(out)?;
    writeln!(out, "{BUILDING_MODULE}")?;
    writeln!(out)?;

    writeln!(out, "union() {{")?;
    writeln!(out, "  base();")?;
    writeln!(out, "  // building(row, col, contributions);")?;
    for b in sl.visible_buildings() {
        writeln!(
            out,
            "  building({}, {}, {}); // {}",
            b.row,
            b.col,
            b.count,
            b.label.replace(['\n', '\r'], " ")
        )?;
    }
    writeln!(out, "}}")?;

    Ok(())
}

/// Emits the program and writes it atomically to `path`.
pub fn write_scad<P: AsRef<Path>>(skyline: &Skyline, path: P, opt: &EmitOptions) -> Result<()> {
    let path = path.as_ref();
    if !opt.allow_empty_model && skyline.is_empty_model() {
        return Err(SkylineError::EmptyModel);
    }

    let start = Instant::now();
    let program = emit(skyline);
    atomic_write(path, program.as_bytes())?;

    info!(
        "OpenSCAD file written to {} in {:?}",
        path.display(),
        start.elapsed()
    );
    Ok(())
}
