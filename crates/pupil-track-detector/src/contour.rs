use pupil_track_types::Point;

use crate::morphology::Mask;

// Neighbor offsets in counterclockwise screen order, starting east.
const DIRS: [(isize, isize); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];
const WEST: usize = 4;

#[derive(Clone, Copy)]
struct RowRun {
    start: usize,
    end: usize,
    row: usize,
    label: u32,
}

/// 8-connected region of a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    /// First pixel of the component in raster order.
    pub start: (usize, usize),
    pub pixels: usize,
    pub min_x: usize,
    pub max_x: usize,
    pub min_y: usize,
    pub max_y: usize,
}

impl Component {
    fn new(x: usize, y: usize) -> Self {
        Self {
            start: (x, y),
            pixels: 0,
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
        }
    }

    /// Upper bound on the area of any polygon through the component's pixel
    /// centers.
    pub fn bbox_area(&self) -> usize {
        (self.max_x - self.min_x) * (self.max_y - self.min_y)
    }
}

#[derive(Default)]
pub(crate) struct ComponentScratch {
    runs: Vec<RowRun>,
    offsets: Vec<usize>,
}

/// Labels the 8-connected regions whose mask value equals `foreground`,
/// returned in raster order of their first pixel.
pub(crate) fn label_components(
    mask: &Mask,
    foreground: bool,
    scratch: &mut ComponentScratch,
) -> Vec<Component> {
    let width = mask.width;
    let height = mask.height;
    let mut components = Vec::new();
    if width == 0 || height == 0 {
        return components;
    }

    let runs = &mut scratch.runs;
    let offsets = &mut scratch.offsets;
    runs.clear();
    offsets.clear();
    offsets.resize(height + 1, 0);

    let is_fg = |value: u8| (value != 0) == foreground;
    let mut cursor = 0usize;
    for row in 0..height {
        offsets[row] = cursor;
        let row_data = &mask.data[row * width..(row + 1) * width];
        let mut x = 0usize;
        while x < width {
            while x < width && !is_fg(row_data[x]) {
                x += 1;
            }
            if x >= width {
                break;
            }
            let start = x;
            while x < width && is_fg(row_data[x]) {
                x += 1;
            }
            runs.push(RowRun {
                start,
                end: x,
                row,
                label: 0,
            });
            cursor += 1;
        }
    }
    offsets[height] = cursor;

    if runs.is_empty() {
        return components;
    }

    let mut dsu = DisjointSet::new();
    for run in runs.iter_mut() {
        run.label = dsu.make_set();
    }

    for row in 1..height {
        let mut prev = offsets[row - 1];
        let prev_end = offsets[row];
        let mut curr = offsets[row];
        let curr_end = offsets[row + 1];

        while prev < prev_end && curr < curr_end {
            let run_a = runs[prev];
            let run_b = runs[curr];
            if runs_touch(&run_a, &run_b) {
                dsu.union(run_a.label, run_b.label);
            }
            if run_a.end <= run_b.end {
                prev += 1;
            } else {
                curr += 1;
            }
        }
    }

    let mut stats: Vec<Option<Component>> = vec![None; dsu.len()];
    for run in runs.iter() {
        let root = dsu.find(run.label);
        let entry = stats[root as usize].get_or_insert_with(|| Component::new(run.start, run.row));
        entry.pixels += run.end - run.start;
        entry.min_x = entry.min_x.min(run.start);
        entry.max_x = entry.max_x.max(run.end - 1);
        entry.min_y = entry.min_y.min(run.row);
        entry.max_y = entry.max_y.max(run.row);
    }

    components.extend(stats.into_iter().flatten());
    components.sort_by_key(|c| (c.start.1, c.start.0));
    components
}

/// Runs on adjacent rows touch when they overlap or meet diagonally.
fn runs_touch(a: &RowRun, b: &RowRun) -> bool {
    a.start <= b.end && b.start <= a.end
}

/// Traces the outer boundary of the component containing `start`, which must
/// be the component's first pixel in raster order.
///
/// Returns the boundary pixels in counterclockwise screen order. A pixel may
/// appear twice where the region is one pixel thick.
pub(crate) fn trace_outer_boundary(
    mask: &Mask,
    foreground: bool,
    start: (usize, usize),
    max_steps: usize,
) -> Vec<Point> {
    let is_fg = |p: (isize, isize)| {
        p.0 >= 0
            && p.1 >= 0
            && (p.0 as usize) < mask.width
            && (p.1 as usize) < mask.height
            && (mask.data[p.1 as usize * mask.width + p.0 as usize] != 0) == foreground
    };
    let step = |p: (isize, isize), dir: usize| (p.0 + DIRS[dir].0, p.1 + DIRS[dir].1);
    let to_point = |p: (isize, isize)| Point::new(p.0 as i32, p.1 as i32);

    let origin = (start.0 as isize, start.1 as isize);
    let mut points = vec![to_point(origin)];

    let Some(first_dir) = (0..8)
        .map(|t| (WEST + 8 - t) % 8)
        .find(|&dir| is_fg(step(origin, dir)))
    else {
        return points;
    };
    let last = step(origin, first_dir);

    let mut current = origin;
    let mut back = first_dir;
    for _ in 0..max_steps {
        let Some((dir, next)) = (1..=8)
            .map(|t| (back + t) % 8)
            .map(|dir| (dir, step(current, dir)))
            .find(|&(_, p)| is_fg(p))
        else {
            break;
        };
        if next == origin && current == last {
            break;
        }
        current = next;
        back = (dir + 4) % 8;
        points.push(to_point(current));
    }
    points
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0i64;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        acc += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    (acc as f64).abs() / 2.0
}

/// Length of a closed polygon.
pub fn closed_perimeter(points: &[Point]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| {
            let dx = (b.x - a.x) as f64;
            let dy = (b.y - a.y) as f64;
            dx.hypot(dy)
        })
        .sum()
}

/// Convex hull (monotone chain) without collinear points.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts = points.to_vec();
    pts.sort_by_key(|p| (p.x, p.y));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: Point, a: Point, b: Point| {
        (a.x - o.x) as i64 * (b.y - o.y) as i64 - (a.y - o.y) as i64 * (b.x - o.x) as i64
    };

    let mut hull: Vec<Point> = Vec::with_capacity(pts.len() * 2);
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

#[derive(Default)]
struct DisjointSet {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new() -> Self {
        Self {
            parent: vec![0],
            rank: vec![0],
        }
    }

    fn len(&self) -> usize {
        self.parent.len()
    }

    fn make_set(&mut self) -> u32 {
        let idx = self.parent.len() as u32;
        self.parent.push(idx);
        self.rank.push(0);
        idx
    }

    fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut node = x;
        while self.parent[node as usize] != root {
            let next = self.parent[node as usize];
            self.parent[node as usize] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let rank_a = self.rank[root_a as usize];
        let rank_b = self.rank[root_b as usize];
        if rank_a < rank_b {
            std::mem::swap(&mut root_a, &mut root_b);
        }
        self.parent[root_b as usize] = root_a;
        if rank_a == rank_b {
            self.rank[root_a as usize] = rank_a + 1;
        }
    }
}
