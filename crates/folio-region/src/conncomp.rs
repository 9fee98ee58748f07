//! Connected component analysis
//!
//! Components are found with the classic two-pass algorithm: a raster scan
//! assigns provisional labels and records equivalences in a union-find
//! forest, a second pass resolves every pixel to its root and renumbers the
//! roots consecutively in scan order.

use crate::error::{RegionError, RegionResult};
use folio_core::{Box, Pix, PixelDepth};

/// Connectivity type for component analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityType {
    /// 4-way connectivity (up, down, left, right)
    #[default]
    FourWay,
    /// 8-way connectivity (includes diagonals)
    EightWay,
}

/// A connected component in an image
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedComponent {
    /// Label of this component in the [`LabelMap`] (starting at 1)
    pub label: u32,
    /// Number of pixels in this component
    pub pixel_count: u32,
    /// Bounding box of this component
    pub bounds: Box,
    /// Mean pixel position
    pub centroid: (f64, f64),
}

/// Label raster produced by [`label_connected_components`].
///
/// Background pixels carry label 0; component `k` carries label `k + 1`
/// and is described by `components()[k]`.
#[derive(Debug, Clone)]
pub struct LabelMap {
    width: u32,
    height: u32,
    labels: Vec<u32>,
    components: Vec<ConnectedComponent>,
}

impl LabelMap {
    /// Width of the labeled image
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the labeled image
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Per-component statistics, ordered by label.
    pub fn components(&self) -> &[ConnectedComponent] {
        &self.components
    }

    /// Statistics for one label, `None` for background or unknown labels.
    pub fn component(&self, label: u32) -> Option<&ConnectedComponent> {
        label
            .checked_sub(1)
            .and_then(|i| self.components.get(i as usize))
    }

    /// Label at (x, y); out-of-bounds coordinates are background.
    #[inline]
    pub fn label_at(&self, x: i32, y: i32) -> u32 {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return 0;
        }
        self.labels[y as usize * self.width as usize + x as usize]
    }

    /// Whether (x, y) belongs to the component with the given label.
    #[inline]
    pub fn contains(&self, label: u32, x: i32, y: i32) -> bool {
        label != 0 && self.label_at(x, y) == label
    }
}

struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new() -> Self {
        // slot 0 is the background
        Self { parent: vec![0] }
    }

    fn make_set(&mut self) -> u32 {
        let id = self.parent.len() as u32;
        self.parent.push(id);
        id
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grand = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grand;
            x = grand;
        }
        x
    }

    fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi as usize] = lo;
        }
    }
}

/// Label all connected components of ink pixels in a binary image.
///
/// # Errors
///
/// Returns [`RegionError::UnsupportedDepth`] if the image is not 1 bpp.
pub fn label_connected_components(
    pix: &Pix,
    connectivity: ConnectivityType,
) -> RegionResult<LabelMap> {
    if pix.depth() != PixelDepth::Bit1 {
        return Err(RegionError::UnsupportedDepth {
            expected: "1 bpp",
            actual: pix.depth().bits(),
        });
    }
    let width = pix.width();
    let height = pix.height();
    let w = width as usize;
    let mut labels = vec![0u32; w * height as usize];
    let mut uf = UnionFind::new();

    for y in 0..height {
        for x in 0..width {
            if pix.get_pixel_unchecked(x, y) == 0 {
                continue;
            }
            let idx = y as usize * w + x as usize;
            let mut neighbors = [0u32; 4];
            let mut n = 0;
            if x > 0 {
                neighbors[n] = labels[idx - 1];
                n += 1;
            }
            if y > 0 {
                neighbors[n] = labels[idx - w];
                n += 1;
                if connectivity == ConnectivityType::EightWay {
                    if x > 0 {
                        neighbors[n] = labels[idx - w - 1];
                        n += 1;
                    }
                    if x + 1 < width {
                        neighbors[n] = labels[idx - w + 1];
                        n += 1;
                    }
                }
            }
            let mut current = 0;
            for &nb in neighbors[..n].iter().filter(|&&l| l != 0) {
                if current == 0 {
                    current = nb;
                } else {
                    uf.union(current, nb);
                }
            }
            labels[idx] = if current == 0 { uf.make_set() } else { current };
        }
    }

    // Resolve roots and renumber in first-seen order.
    let mut remap = vec![0u32; uf.parent.len()];
    let mut next = 0u32;
    struct Acc {
        count: u32,
        sx: f64,
        sy: f64,
        x0: u32,
        y0: u32,
        x1: u32,
        y1: u32,
    }
    let mut accs: Vec<Acc> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let idx = y as usize * w + x as usize;
            if labels[idx] == 0 {
                continue;
            }
            let root = uf.find(labels[idx]) as usize;
            if remap[root] == 0 {
                next += 1;
                remap[root] = next;
                accs.push(Acc {
                    count: 0,
                    sx: 0.0,
                    sy: 0.0,
                    x0: x,
                    y0: y,
                    x1: x,
                    y1: y,
                });
            }
            let label = remap[root];
            labels[idx] = label;
            let a = &mut accs[label as usize - 1];
            a.count += 1;
            a.sx += x as f64;
            a.sy += y as f64;
            a.x0 = a.x0.min(x);
            a.x1 = a.x1.max(x);
            a.y1 = a.y1.max(y);
        }
    }

    let components = accs
        .iter()
        .enumerate()
        .map(|(i, a)| ConnectedComponent {
            label: i as u32 + 1,
            pixel_count: a.count,
            bounds: Box::new_unchecked(
                a.x0 as i32,
                a.y0 as i32,
                (a.x1 - a.x0 + 1) as i32,
                (a.y1 - a.y0 + 1) as i32,
            ),
            centroid: (a.sx / a.count as f64, a.sy / a.count as f64),
        })
        .collect();

    Ok(LabelMap {
        width,
        height,
        labels,
        components,
    })
}

/// Find all connected components in a binary image
///
/// Returns the per-component statistics without the label raster.
pub fn find_connected_components(
    pix: &Pix,
    connectivity: ConnectivityType,
) -> RegionResult<Vec<ConnectedComponent>> {
    Ok(label_connected_components(pix, connectivity)?.components)
}
