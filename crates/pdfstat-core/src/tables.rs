//! Ruled table detection
//!
//! Tables are found from vector rulings: horizontal and vertical edges of
//! painted paths are grouped into connected grids, the grid lines define
//! cells, and text spans are dropped into the cell containing their
//! origin. A detected grid only counts as a table when, after stripping
//! blank cells, at least one non-blank cell remains.
//!
//! Counting is a pass of its own over the document's pages, independent of
//! the page scan used for the other features.

use tracing::{debug, warn};

use crate::content::{interpret_page, PageContent, Point};
use crate::validator::ValidatedDocument;

/// Snap distance for treating edges as axis-aligned, touching or equal
pub const EDGE_TOLERANCE: f64 = 3.0;

/// Grids with fewer cells are plain boxes, not tables
pub const MIN_TABLE_CELLS: usize = 2;

/// Cell text of one detected grid, top row first
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Drop blank cells, then rows left with nothing in them
    pub fn cleaned(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|cell| !cell.trim().is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|row| !row.is_empty())
            .collect()
    }

    pub fn has_content(&self) -> bool {
        !self.cleaned().is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Orientation {
    Horizontal,
    Vertical,
}

/// An axis-aligned ruling: `fixed` is y for horizontals, x for verticals
#[derive(Debug, Clone, Copy)]
struct Edge {
    orientation: Orientation,
    fixed: f64,
    from: f64,
    to: f64,
}

impl Edge {
    fn from_segment(start: Point, end: Point) -> Option<Edge> {
        let dx = (end.x - start.x).abs();
        let dy = (end.y - start.y).abs();
        if dy <= EDGE_TOLERANCE && dx > EDGE_TOLERANCE {
            Some(Edge {
                orientation: Orientation::Horizontal,
                fixed: (start.y + end.y) / 2.0,
                from: start.x.min(end.x),
                to: start.x.max(end.x),
            })
        } else if dx <= EDGE_TOLERANCE && dy > EDGE_TOLERANCE {
            Some(Edge {
                orientation: Orientation::Vertical,
                fixed: (start.x + end.x) / 2.0,
                from: start.y.min(end.y),
                to: start.y.max(end.y),
            })
        } else {
            None
        }
    }

    fn crosses(&self, other: &Edge) -> bool {
        let (h, v) = match (self.orientation, other.orientation) {
            (Orientation::Horizontal, Orientation::Vertical) => (self, other),
            (Orientation::Vertical, Orientation::Horizontal) => (other, self),
            _ => return false,
        };
        v.fixed >= h.from - EDGE_TOLERANCE
            && v.fixed <= h.to + EDGE_TOLERANCE
            && h.fixed >= v.from - EDGE_TOLERANCE
            && h.fixed <= v.to + EDGE_TOLERANCE
    }
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Merge values closer than the tolerance, returning sorted cluster means
fn cluster(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    let mut clusters: Vec<Vec<f64>> = Vec::new();
    for v in values {
        match clusters.last_mut() {
            Some(group) if v - group[group.len() - 1] <= EDGE_TOLERANCE => group.push(v),
            _ => clusters.push(vec![v]),
        }
    }
    clusters
        .into_iter()
        .map(|g| g.iter().sum::<f64>() / g.len() as f64)
        .collect()
}

/// Index of the band `[bounds[i], bounds[i + 1])` containing `value`
fn band(bounds: &[f64], value: f64) -> Option<usize> {
    bounds
        .windows(2)
        .position(|w| value >= w[0] && value < w[1])
}

/// All ruled grids on a page with their cell text
pub fn detect_tables(content: &PageContent) -> Vec<Table> {
    let edges: Vec<Edge> = content
        .paths
        .iter()
        .flat_map(|p| p.segments.iter())
        .filter_map(|s| Edge::from_segment(s.start, s.end))
        .collect();
    if edges.len() < 4 {
        return Vec::new();
    }

    let mut sets = DisjointSet::new(edges.len());
    for i in 0..edges.len() {
        for j in (i + 1)..edges.len() {
            if edges[i].crosses(&edges[j]) {
                sets.union(i, j);
            }
        }
    }

    let mut components: Vec<(usize, Vec<usize>)> = Vec::new();
    for i in 0..edges.len() {
        let root = sets.find(i);
        match components.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(i),
            None => components.push((root, vec![i])),
        }
    }

    let mut tables = Vec::new();
    for (_, members) in components {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for &i in &members {
            match edges[i].orientation {
                Orientation::Vertical => xs.push(edges[i].fixed),
                Orientation::Horizontal => ys.push(edges[i].fixed),
            }
        }
        let xs = cluster(xs);
        let ys = cluster(ys);
        if xs.len() < 2 || ys.len() < 2 {
            continue;
        }

        let (rows, cols) = (ys.len() - 1, xs.len() - 1);
        if rows * cols < MIN_TABLE_CELLS {
            continue;
        }

        let mut cells = vec![vec![String::new(); cols]; rows];
        for span in &content.spans {
            let (Some(col), Some(band_index)) = (band(&xs, span.origin.x), band(&ys, span.origin.y))
            else {
                continue;
            };
            // ys ascend bottom-up; rows are reported top-down
            let row = rows - 1 - band_index;
            let cell = &mut cells[row][col];
            if !cell.is_empty() {
                cell.push(' ');
            }
            cell.push_str(&span.text);
        }

        tables.push(Table { rows: cells });
    }

    tables
}

/// Number of tables with content across all pages of a document
pub fn count_tables(doc: &ValidatedDocument) -> usize {
    let document = &doc.document;
    let mut total = 0;

    for (index, page_id) in document.get_pages().into_values().enumerate() {
        match interpret_page(document, page_id, index) {
            Ok(content) => {
                let kept = detect_tables(&content)
                    .iter()
                    .filter(|t| t.has_content())
                    .count();
                if kept > 0 {
                    debug!("Page {}: {} tables", index, kept);
                }
                total += kept;
            }
            Err(e) => warn!("{}: table pass skipped page: {}", doc.path.display(), e),
        }
    }

    total
}
