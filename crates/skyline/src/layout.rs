use crate::error::{Result, SkylineError};
use crate::stats::{Bucket, max_count};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_BASE_MARGIN: f64 = 1.0;
pub const DEFAULT_BASE_HEIGHT: f64 = 5.0;
pub const DEFAULT_BASE_ANGLE: f64 = 22.5;

/// Target footprint ratio, e.g. 16:9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SkylineError::InvalidAspectRatio(format!("{width}:{height}")));
        }
        Ok(Self { width, height })
    }

    pub fn ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self {
            width: 16,
            height: 9,
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = SkylineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SkylineError::InvalidAspectRatio(s.to_string());
        let (w, h) = s.split_once(':').ok_or_else(invalid)?;
        let w: u32 = w.trim().parse().map_err(|_| invalid())?;
        let h: u32 = h.trim().parse().map_err(|_| invalid())?;
        AspectRatio::new(w, h).map_err(|_| invalid())
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = SkylineError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(a: AspectRatio) -> Self {
        a.to_string()
    }
}

/// Axis-aligned box in millimetres. `width` runs along x, `length` along y
/// and `height` along z.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub width: f64,
    pub length: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    pub bounds: BoundingBox,
    pub col: usize,
    pub row: usize,
    pub count: u64,
    /// Key of the source bucket
    pub label: String,
}

/// Plinth under the buildings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseParams {
    pub margin: f64,
    pub height: f64,
    /// Wall slope in degrees
    pub angle: f64,
}

impl Default for BaseParams {
    fn default() -> Self {
        Self {
            margin: DEFAULT_BASE_MARGIN,
            height: DEFAULT_BASE_HEIGHT,
            angle: DEFAULT_BASE_ANGLE,
        }
    }
}

/// Everything the layout engine needs besides the buckets themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct SkylineParams {
    pub aspect_ratio: AspectRatio,
    pub max_building_height: f64,
    pub building_width: f64,
    pub building_length: f64,
    pub base: BaseParams,
    pub font: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    pub left: String,
    pub right: String,
}

/// Column-major cell arena: cell `(col, row)` lives at `col * rows + row`
/// and holds the index of its building, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    cols: usize,
    rows: usize,
    cells: Vec<Option<usize>>,
}

impl Grid {
    fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![None; cols * rows],
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    fn index(&self, col: usize, row: usize) -> usize {
        col * self.rows + row
    }

    /// Index into `Skyline::buildings` of the building at `(col, row)`.
    pub fn get(&self, col: usize, row: usize) -> Option<usize> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.cells[self.index(col, row)]
    }

    fn set(&mut self, col: usize, row: usize, building: usize) {
        let idx = self.index(col, row);
        self.cells[idx] = Some(building);
    }

    /// Number of cells without a building.
    pub fn empty_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }
}

/// Laid-out model, ready for emission.
#[derive(Debug, Clone, PartialEq)]
pub struct Skyline {
    /// In bucket order, which is also column-major cell order
    pub buildings: Vec<Building>,
    pub grid: Grid,
    pub bounds: BoundingBox,
    pub base: BaseParams,
    pub building_width: f64,
    pub building_length: f64,
    pub max_building_height: f64,
    pub max_count: u64,
    pub font: String,
    pub left_label: String,
    pub right_label: String,
}

impl Skyline {
    /// Buildings that will actually be instantiated.
    pub fn visible_buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings.iter().filter(|b| b.count > 0)
    }

    pub fn is_empty_model(&self) -> bool {
        self.visible_buildings().next().is_none()
    }

    /// Footprint of the plinth top (skyline plus margin on each side).
    pub fn base_footprint(&self) -> (f64, f64) {
        let m = 2.0 * self.base.margin;
        (self.bounds.width + m, self.bounds.length + m)
    }
}

/// Grid dimensions `(cols, rows)` for `n` buckets at the given ratio.
///
/// `cols = ceil(sqrt(n * ratio))`, `rows = ceil(n / cols)`, then trailing
/// unused columns are dropped with `cols = ceil(n / rows)`.
pub fn grid_size(n: usize, aspect_ratio: f64) -> Result<(usize, usize)> {
    if n == 0 {
        return Err(SkylineError::EmptyInput);
    }

    let nf = n as f64;
    let mut cols = (nf * aspect_ratio).sqrt().ceil().max(1.0) as usize;
    let rows = (nf / cols as f64).ceil() as usize;

    if cols * rows > n {
        cols = (nf / rows as f64).ceil() as usize;
    }

    Ok((cols, rows))
}

/// Linear height normalisation; 0 when nothing has been counted.
pub fn building_height(count: u64, max_count: u64, max_height: f64) -> f64 {
    if max_count == 0 {
        return 0.0;
    }
    count as f64 / max_count as f64 * max_height
}

pub struct SkylineGenerator {
    params: SkylineParams,
}

impl SkylineGenerator {
    pub fn new(params: SkylineParams) -> Self {
        Self { params }
    }

    pub fn generate(&self, buckets: &[Bucket], labels: Labels) -> Result<Skyline> {
        let p = &self.params;
        let (cols, rows) = grid_size(buckets.len(), p.aspect_ratio.ratio())?;
        let max_count = max_count(buckets);

        info!("Skyline details:");
        info!("  Buildings: {} ({} x {} matrix)", buckets.len(), cols, rows);
        info!(
            "  Dimensions: {:.1}mm x {:.1}mm",
            cols as f64 * p.building_width,
            rows as f64 * p.building_length
        );

        let mut grid = Grid::new(cols, rows);
        let mut buildings = Vec::with_capacity(buckets.len());

        // Column-major fill: column 0 top to bottom, then column 1, ...
        let cells = (0..cols).flat_map(|col| (0..rows).map(move |row| (col, row)));
        for ((col, row), bucket) in cells.zip(buckets) {
            let min_x = col as f64 * p.building_width;
            let min_y = row as f64 * p.building_length;
            let building = Building {
                bounds: BoundingBox {
                    min_x,
                    min_y,
                    max_x: min_x + p.building_width,
                    max_y: min_y + p.building_length,
                    width: p.building_width,
                    length: p.building_length,
                    height: building_height(bucket.count, max_count, p.max_building_height),
                },
                col,
                row,
                count: bucket.count,
                label: bucket.key.clone(),
            };
            grid.set(col, row, buildings.len());
            buildings.push(building);
        }
        debug!("{} empty cells left in grid", grid.empty_cells());

        let width = cols as f64 * p.building_width;
        let length = rows as f64 * p.building_length;

        Ok(Skyline {
            buildings,
            grid,
            bounds: BoundingBox {
                min_x: 0.0,
                min_y: 0.0,
                max_x: width,
                max_y: length,
                width,
                length,
                height: p.max_building_height,
            },
            base: p.base,
            building_width: p.building_width,
            building_length: p.building_length,
            max_building_height: p.max_building_height,
            max_count,
            font: p.font.clone(),
            left_label: labels.left,
            right_label: labels.right,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(aspect: AspectRatio, max_height: f64) -> SkylineParams {
        SkylineParams {
            aspect_ratio: aspect,
            max_building_height: max_height,
            building_width: 2.0,
            building_length: 2.0,
            base: BaseParams::default(),
            font: "Liberation Sans".to_string(),
        }
    }

    fn buckets(counts: &[u64]) -> Vec<Bucket> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &c)| Bucket::new(format!("{:03}", i + 1), c))
            .collect()
    }

    #[test]
    fn test_grid_size_scenario() {
        assert_eq!(grid_size(3, 2.0).unwrap(), (3, 1));
    }

    #[test]
    fn test_grid_size_shrink_pass() {
        // cols = ceil(sqrt(10)) = 4, rows = ceil(10 / 4) = 3, 12 > 10 -> cols = ceil(10 / 3) = 4
        assert_eq!(grid_size(10, 1.0).unwrap(), (4, 3));
        // cols = ceil(sqrt(5 * 16 / 9)) = 3, rows = 2, 6 > 5 -> cols = 3
        assert_eq!(grid_size(5, 16.0 / 9.0).unwrap(), (3, 2));
        // cols = ceil(sqrt(7 * 0.25)) = 2, rows = 4, 8 > 7 -> cols = 2
        assert_eq!(grid_size(7, 0.25).unwrap(), (2, 4));
        // cols = ceil(sqrt(13 * 0.1)) = 2, rows = 7, 14 > 13 -> cols = 2
        assert_eq!(grid_size(13, 0.1).unwrap(), (2, 7));
    }

    #[test]
    fn test_grid_size_empty() {
        assert!(matches!(grid_size(0, 1.0), Err(SkylineError::EmptyInput)));
    }

    #[test]
    fn test_grid_size_invariants() {
        for ratio in [0.1, 0.5, 1.0, 16.0 / 9.0, 2.0, 4.0, 10.0] {
            for n in 1..=400 {
                let (cols, rows) = grid_size(n, ratio).unwrap();
                assert!(cols * rows >= n, "n={n} ratio={ratio}: {cols}x{rows}");
                assert!(cols * (rows - 1) < n, "n={n} ratio={ratio}: {cols}x{rows}");
            }
        }
    }

    #[test]
    fn test_generate_scenario() {
        let generator = SkylineGenerator::new(params(AspectRatio::new(2, 1).unwrap(), 10.0));
        let b = vec![Bucket::new("1", 2), Bucket::new("2", 4), Bucket::new("3", 1)];
        let skyline = generator.generate(&b, Labels::default()).unwrap();

        assert_eq!((skyline.grid.cols(), skyline.grid.rows()), (3, 1));
        let cells: Vec<(usize, usize)> = skyline.buildings.iter().map(|b| (b.col, b.row)).collect();
        assert_eq!(cells, [(0, 0), (1, 0), (2, 0)]);

        let heights: Vec<f64> = skyline.buildings.iter().map(|b| b.bounds.height).collect();
        assert_eq!(heights, [5.0, 10.0, 2.5]);
        assert_eq!(skyline.max_count, 4);
    }

    #[test]
    fn test_generate_column_major_order() {
        let generator = SkylineGenerator::new(params(AspectRatio::new(1, 1).unwrap(), 20.0));
        let b = buckets(&[1; 10]);
        let skyline = generator.generate(&b, Labels::default()).unwrap();

        // 4 x 3 grid: first column holds buckets 0..3
        assert_eq!((skyline.buildings[2].col, skyline.buildings[2].row), (0, 2));
        assert_eq!((skyline.buildings[3].col, skyline.buildings[3].row), (1, 0));

        for pair in skyline.buildings.windows(2) {
            assert!((pair[0].col, pair[0].row) < (pair[1].col, pair[1].row));
            assert!(pair[0].label < pair[1].label);
        }

        assert_eq!(skyline.grid.get(3, 0), Some(9));
        assert_eq!(skyline.grid.get(3, 1), None);
        assert_eq!(skyline.grid.get(9, 9), None);
        assert_eq!(skyline.grid.empty_cells(), 2);
    }

    #[test]
    fn test_generate_geometry() {
        let mut p = params(AspectRatio::new(1, 1).unwrap(), 20.0);
        p.building_width = 1.5;
        p.building_length = 3.0;
        let skyline = SkylineGenerator::new(p)
            .generate(&buckets(&[1, 2, 3, 4, 5]), Labels::default())
            .unwrap();

        // 5 buckets at 1:1 -> 3 x 2
        let last = &skyline.buildings[4];
        assert_eq!((last.col, last.row), (2, 0));
        assert_eq!(last.bounds.min_x, 3.0);
        assert_eq!(last.bounds.max_x, 4.5);
        assert_eq!(last.bounds.min_y, 0.0);
        assert_eq!(last.bounds.max_y, 3.0);

        assert_eq!(skyline.bounds.width, 4.5);
        assert_eq!(skyline.bounds.length, 6.0);
        assert_eq!(skyline.bounds.height, 20.0);
        assert_eq!(skyline.base_footprint(), (6.5, 8.0));
    }

    #[test]
    fn test_generate_max_height_normalisation() {
        let generator = SkylineGenerator::new(params(AspectRatio::default(), 20.0));
        let skyline = generator
            .generate(&buckets(&[3, 17, 0, 9]), Labels::default())
            .unwrap();

        let tallest = skyline
            .buildings
            .iter()
            .max_by_key(|b| b.count)
            .unwrap();
        assert!((tallest.bounds.height - 20.0).abs() < 1e-9);
        assert_eq!(skyline.buildings[2].bounds.height, 0.0);
        assert_eq!(skyline.visible_buildings().count(), 3);
    }

    #[test]
    fn test_generate_all_zero() {
        let generator = SkylineGenerator::new(params(AspectRatio::default(), 20.0));
        let skyline = generator
            .generate(&buckets(&[0, 0, 0]), Labels::default())
            .unwrap();

        assert_eq!(skyline.max_count, 0);
        assert!(skyline.buildings.iter().all(|b| b.bounds.height == 0.0));
        assert!(skyline.is_empty_model());
        assert!(skyline.bounds.width > 0.0 && skyline.bounds.length > 0.0);
    }

    #[test]
    fn test_generate_empty() {
        let generator = SkylineGenerator::new(params(AspectRatio::default(), 20.0));
        let result = generator.generate(&[], Labels::default());
        assert!(matches!(result, Err(SkylineError::EmptyInput)));
    }

    #[test]
    fn test_generate_carries_labels_and_base() {
        let generator = SkylineGenerator::new(params(AspectRatio::default(), 20.0));
        let labels = Labels {
            left: "@octocat".to_string(),
            right: "2020-2023".to_string(),
        };
        let skyline = generator.generate(&buckets(&[1]), labels).unwrap();

        assert_eq!(skyline.left_label, "@octocat");
        assert_eq!(skyline.right_label, "2020-2023");
        assert_eq!(skyline.base, BaseParams::default());
        assert_eq!(skyline.font, "Liberation Sans");
    }

    #[test]
    fn test_aspect_ratio_parse() {
        let a: AspectRatio = "16:9".parse().unwrap();
        assert_eq!(a, AspectRatio::new(16, 9).unwrap());
        assert!((a.ratio() - 16.0 / 9.0).abs() < 1e-12);

        assert!("16x9".parse::<AspectRatio>().is_err());
        assert!("0:9".parse::<AspectRatio>().is_err());
        assert!("16:".parse::<AspectRatio>().is_err());
    }
}
