//! Page content interpretation
//!
//! Walks a page's content stream with lopdf and records the three things
//! the feature pipeline cares about:
//!
//! - text spans (decoded text, resolved font name, effective size, origin)
//! - painted vector paths (stroke/fill color and straight segments)
//! - image XObjects drawn on the page, including those inside form XObjects
//!
//! This is not a renderer. Glyph widths are never consulted, so span
//! origins are where a run starts, not where each glyph lands.

use std::collections::HashSet;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use crate::error::PdfStatError;

/// Form XObjects nested deeper than this are ignored
pub const MAX_FORM_DEPTH: usize = 8;

/// Vertical distance under which two spans share a line
const LINE_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

/// Affine transform `[a b c d e f]` in PDF row-vector convention
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() < 6 {
            return None;
        }
        Some(Matrix {
            a: number(&operands[0])?,
            b: number(&operands[1])?,
            c: number(&operands[2])?,
            d: number(&operands[3])?,
            e: number(&operands[4])?,
            f: number(&operands[5])?,
        })
    }

    /// `self` applied first, then `other`
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> Point {
        Point {
            x: self.a * x + self.c * y + self.e,
            y: self.b * x + self.d * y + self.f,
        }
    }

    /// Length of the transformed unit y vector
    pub fn vertical_scale(&self) -> f64 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

/// Device color reduced to 8-bit RGB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);

    pub fn gray(g: f64) -> Self {
        let v = channel(g);
        Rgb(v, v, v)
    }

    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Rgb(channel(r), channel(g), channel(b))
    }

    pub fn cmyk(c: f64, m: f64, y: f64, k: f64) -> Self {
        let k = k.clamp(0.0, 1.0);
        Rgb::rgb(
            (1.0 - c.clamp(0.0, 1.0)) * (1.0 - k),
            (1.0 - m.clamp(0.0, 1.0)) * (1.0 - k),
            (1.0 - y.clamp(0.0, 1.0)) * (1.0 - k),
        )
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

fn channel(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// A run of text drawn with one font at one size
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub font: Option<String>,
    pub size: f64,
    pub origin: Point,
}

/// A path that was actually painted. `stroke`/`fill` hold the color used
/// by that painting mode, `None` when the mode was not used or the color
/// carries no device value (patterns).
#[derive(Debug, Clone, PartialEq)]
pub struct PaintedPath {
    pub stroke: Option<Rgb>,
    pub fill: Option<Rgb>,
    pub stroked: bool,
    pub filled: bool,
    pub segments: Vec<Segment>,
}

impl PaintedPath {
    /// Colors this drawing contributes, stroke first
    pub fn colors(&self) -> impl Iterator<Item = Rgb> + '_ {
        self.stroke.iter().chain(self.fill.iter()).copied()
    }
}

/// Everything recorded for one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub spans: Vec<TextSpan>,
    pub paths: Vec<PaintedPath>,
    pub image_count: usize,
}

impl PageContent {
    /// Page text in drawing order, one line per baseline change
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut last_y: Option<f64> = None;

        for span in &self.spans {
            if let Some(y) = last_y {
                if (span.origin.y - y).abs() > LINE_TOLERANCE {
                    out.push('\n');
                } else if !out.ends_with(char::is_whitespace)
                    && !span.text.starts_with(char::is_whitespace)
                {
                    out.push(' ');
                }
            }
            out.push_str(&span.text);
            last_y = Some(span.origin.y);
        }

        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Interpret one page. Fails only when the content stream itself cannot
/// be read or decoded; unknown or malformed operators are skipped.
pub fn interpret_page(
    doc: &Document,
    page_id: ObjectId,
    index: usize,
) -> Result<PageContent, PdfStatError> {
    let fail = |reason: String| PdfStatError::PageExtraction {
        page: index,
        reason,
    };

    let raw = doc
        .get_page_content(page_id)
        .map_err(|e| fail(format!("content stream unreadable: {}", e)))?;
    let resources = page_resources(doc, page_id);

    let mut interpreter = Interpreter::new(doc);
    interpreter
        .run(&raw, resources, 0)
        .map_err(|e| fail(format!("content stream undecodable: {}", e)))?;

    debug!(
        "Page {}: {} spans, {} paths, {} images",
        index,
        interpreter.content.spans.len(),
        interpreter.content.paths.len(),
        interpreter.content.image_count
    );
    Ok(interpreter.content)
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    stroke: Option<Rgb>,
    fill: Option<Rgb>,
    font: Option<String>,
    font_size: f64,
    leading: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            stroke: Some(Rgb::BLACK),
            fill: Some(Rgb::BLACK),
            font: None,
            font_size: 0.0,
            leading: 0.0,
        }
    }
}

#[derive(Debug, Default)]
struct PathBuilder {
    segments: Vec<Segment>,
    current: Option<Point>,
    subpath_start: Option<Point>,
    has_geometry: bool,
}

impl PathBuilder {
    fn move_to(&mut self, p: Point) {
        self.current = Some(p);
        self.subpath_start = Some(p);
        self.has_geometry = true;
    }

    fn line_to(&mut self, p: Point) {
        if let Some(start) = self.current {
            self.segments.push(Segment { start, end: p });
        }
        self.current = Some(p);
        self.has_geometry = true;
    }

    fn jump_to(&mut self, p: Point) {
        self.current = Some(p);
        self.has_geometry = true;
    }

    fn close(&mut self) {
        if let (Some(current), Some(start)) = (self.current, self.subpath_start) {
            if current != start {
                self.segments.push(Segment {
                    start: current,
                    end: start,
                });
            }
            self.current = Some(start);
        }
    }

    fn take(&mut self) -> Option<Vec<Segment>> {
        let had = self.has_geometry;
        let segments = std::mem::take(&mut self.segments);
        *self = PathBuilder::default();
        had.then_some(segments)
    }
}

struct Interpreter<'a> {
    doc: &'a Document,
    content: PageContent,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    path: PathBuilder,
    span_open: bool,
    seen_images: HashSet<ImageKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ImageKey {
    Object(ObjectId),
    Inline(Vec<u8>),
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            content: PageContent::default(),
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            path: PathBuilder::default(),
            span_open: false,
            seen_images: HashSet::new(),
        }
    }

    fn run(
        &mut self,
        raw: &[u8],
        resources: Option<&'a Dictionary>,
        depth: usize,
    ) -> Result<(), lopdf::Error> {
        let content = Content::decode(raw)?;
        for op in &content.operations {
            self.apply(op, resources, depth);
        }
        Ok(())
    }

    fn point(&self, operands: &[Object], at: usize) -> Option<Point> {
        let x = number(operands.get(at)?)?;
        let y = number(operands.get(at + 1)?)?;
        Some(self.state.ctm.apply(x, y))
    }

    fn apply(&mut self, op: &Operation, resources: Option<&'a Dictionary>, depth: usize) {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            // Graphics state
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.state.ctm = m.multiply(&self.state.ctm);
                }
            }

            // Color
            "RG" | "G" | "K" | "SC" | "SCN" => self.state.stroke = color_from_operands(operands),
            "rg" | "g" | "k" | "sc" | "scn" => self.state.fill = color_from_operands(operands),
            "CS" => self.state.stroke = initial_color(operands),
            "cs" => self.state.fill = initial_color(operands),

            // Path construction
            "m" => {
                if let Some(p) = self.point(operands, 0) {
                    self.path.move_to(p);
                }
            }
            "l" => {
                if let Some(p) = self.point(operands, 0) {
                    self.path.line_to(p);
                }
            }
            "c" | "v" | "y" => {
                let end = operands.len().saturating_sub(2);
                if let Some(p) = self.point(operands, end) {
                    self.path.jump_to(p);
                }
            }
            "re" => self.rectangle(operands),
            "h" => self.path.close(),

            // Path painting
            "S" => self.paint(true, false),
            "s" => {
                self.path.close();
                self.paint(true, false);
            }
            "f" | "F" | "f*" => self.paint(false, true),
            "B" | "B*" => self.paint(true, true),
            "b" | "b*" => {
                self.path.close();
                self.paint(true, true);
            }
            "n" => {
                self.path.take();
            }

            // Text objects and state
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
                self.span_open = false;
            }
            "ET" => self.span_open = false,
            "Tf" => {
                if let Some(Ok(name)) = operands.first().map(|o| o.as_name()) {
                    self.state.font = Some(resolve_font_name(self.doc, resources, name));
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    self.state.font_size = size;
                }
                self.span_open = false;
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    self.state.leading = leading;
                }
            }

            // Text positioning
            "Td" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    self.move_text(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    self.state.leading = -ty;
                    self.move_text(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                    self.span_open = false;
                }
            }
            "T*" => self.next_line(),

            // Text showing
            "Tj" | "TJ" => {
                if let Some(operand) = operands.first() {
                    self.show(operand);
                }
            }
            "'" => {
                self.next_line();
                if let Some(operand) = operands.first() {
                    self.show(operand);
                }
            }
            "\"" => {
                self.next_line();
                if let Some(operand) = operands.get(2) {
                    self.show(operand);
                }
            }

            // External objects
            "Do" => {
                if let Some(Ok(name)) = operands.first().map(|o| o.as_name()) {
                    self.draw_xobject(name, resources, depth);
                }
            }

            _ => {}
        }
    }

    fn rectangle(&mut self, operands: &[Object]) {
        let values: Option<Vec<f64>> = operands.iter().take(4).map(number).collect();
        let Some(v) = values.filter(|v| v.len() == 4) else {
            return;
        };
        let (x, y, w, h) = (v[0], v[1], v[2], v[3]);
        let ctm = self.state.ctm;
        self.path.move_to(ctm.apply(x, y));
        self.path.line_to(ctm.apply(x + w, y));
        self.path.line_to(ctm.apply(x + w, y + h));
        self.path.line_to(ctm.apply(x, y + h));
        self.path.close();
    }

    fn paint(&mut self, stroke: bool, fill: bool) {
        let Some(segments) = self.path.take() else {
            return;
        };
        self.content.paths.push(PaintedPath {
            stroke: if stroke { self.state.stroke } else { None },
            fill: if fill { self.state.fill } else { None },
            stroked: stroke,
            filled: fill,
            segments,
        });
    }

    fn move_text(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translate(tx, ty).multiply(&self.line_matrix);
        self.text_matrix = self.line_matrix;
        self.span_open = false;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_text(0.0, -leading);
    }

    fn show(&mut self, operand: &Object) {
        let Some(text) = decode_text_operand(operand) else {
            return;
        };
        if text.is_empty() {
            return;
        }

        if self.span_open {
            if let Some(span) = self.content.spans.last_mut() {
                span.text.push_str(&text);
                return;
            }
        }

        let rendering = self.text_matrix.multiply(&self.state.ctm);
        self.content.spans.push(TextSpan {
            text,
            font: self.state.font.clone(),
            size: self.state.font_size.abs() * rendering.vertical_scale(),
            origin: rendering.apply(0.0, 0.0),
        });
        self.span_open = true;
    }

    fn draw_xobject(&mut self, name: &[u8], resources: Option<&'a Dictionary>, depth: usize) {
        let Some(entry) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|x| deref_dict(self.doc, x))
            .and_then(|x| x.get(name).ok())
        else {
            return;
        };

        let key = match entry {
            Object::Reference(id) => ImageKey::Object(*id),
            _ => ImageKey::Inline(name.to_vec()),
        };
        let Some(Ok(stream)) = deref(self.doc, entry).map(|o| o.as_stream()) else {
            return;
        };

        let subtype = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(|s| s.as_name().ok());

        match subtype {
            Some(b"Image") => {
                if self.seen_images.insert(key) {
                    self.content.image_count += 1;
                }
            }
            Some(b"Form") if depth < MAX_FORM_DEPTH => {
                let raw = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| deref_dict(self.doc, r))
                    .or(resources);

                let saved = self.state.clone();
                if let Some(m) = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|m| m.as_array().ok())
                    .and_then(|m| Matrix::from_operands(m))
                {
                    self.state.ctm = m.multiply(&self.state.ctm);
                }
                if let Err(e) = self.run(&raw, form_resources, depth + 1) {
                    debug!("Skipping undecodable form XObject: {}", e);
                }
                self.state = saved;
                self.span_open = false;
            }
            _ => {}
        }
    }
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn color_from_operands(operands: &[Object]) -> Option<Rgb> {
    // A trailing name selects a pattern, which has no device color
    if operands.iter().any(|o| matches!(o, Object::Name(_))) {
        return None;
    }
    let values: Option<Vec<f64>> = operands.iter().map(number).collect();
    match values?.as_slice() {
        [g] => Some(Rgb::gray(*g)),
        [r, g, b] => Some(Rgb::rgb(*r, *g, *b)),
        [c, m, y, k] => Some(Rgb::cmyk(*c, *m, *y, *k)),
        _ => None,
    }
}

fn initial_color(operands: &[Object]) -> Option<Rgb> {
    match operands.first().map(|o| o.as_name()) {
        Some(Ok(b"Pattern")) => None,
        _ => Some(Rgb::BLACK),
    }
}

fn deref<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..MAX_FORM_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

fn deref_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    deref(doc, obj)?.as_dict().ok()
}

/// Resources of a page, inherited through the page tree when absent
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Some(resources) = node.get(b"Resources").ok().and_then(|r| deref_dict(doc, r)) {
            return Some(resources);
        }
        node = node
            .get(b"Parent")
            .ok()
            .and_then(|p| deref_dict(doc, p))?;
    }
    None
}

/// BaseFont of a font resource with any subset tag (`ABCDEF+`) removed,
/// or the resource name itself when the font cannot be resolved
fn resolve_font_name(doc: &Document, resources: Option<&Dictionary>, name: &[u8]) -> String {
    let base = resources
        .and_then(|r| r.get(b"Font").ok())
        .and_then(|f| deref_dict(doc, f))
        .and_then(|f| f.get(name).ok())
        .and_then(|f| deref_dict(doc, f))
        .and_then(|f| f.get(b"BaseFont").ok())
        .and_then(|b| b.as_name().ok())
        .unwrap_or(name);

    let base = String::from_utf8_lossy(base).into_owned();
    strip_subset_tag(&base).to_string()
}

/// `ABCDEF+Arial` -> `Arial`
pub fn strip_subset_tag(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.chars().all(|c| c.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

fn decode_text_operand(operand: &Object) -> Option<String> {
    match operand {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Array(items) => {
            let mut text = String::new();
            for item in items {
                match item {
                    Object::String(bytes, _) => text.push_str(&decode_pdf_string(bytes)),
                    // Large negative adjustments are inter-word gaps
                    other => {
                        if number(other).map(|n| n < -100.0).unwrap_or(false) {
                            text.push(' ');
                        }
                    }
                }
            }
            Some(text)
        }
        _ => None,
    }
}

/// UTF-16BE when BOM-marked, then UTF-8, then Latin-1
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&units) {
            return s;
        }
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}
