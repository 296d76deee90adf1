//! In-memory PDF construction for tests
//!
//! Builds small but structurally complete documents with lopdf: a catalog,
//! a flat page tree, per-page resources (fonts and image XObjects) and a
//! hand-written content stream per page.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// One page worth of content plus the resources it references
#[derive(Debug, Clone, Default)]
pub struct PageSpec {
    content: String,
    fonts: Vec<(String, String)>,
    images: Vec<String>,
}

impl PageSpec {
    pub fn new() -> Self {
        Self::default()
    }

    fn font_resource(&mut self, base_font: &str) -> String {
        if let Some((name, _)) = self.fonts.iter().find(|(_, base)| base == base_font) {
            return name.clone();
        }
        let name = format!("F{}", self.fonts.len() + 1);
        self.fonts.push((name.clone(), base_font.to_string()));
        name
    }

    /// Show `text` in its own BT/ET block at (x, y)
    pub fn text(mut self, base_font: &str, size: f64, x: f64, y: f64, text: &str) -> Self {
        let font = self.font_resource(base_font);
        self.content.push_str(&format!(
            "BT /{} {} Tf {} {} Td ({}) Tj ET\n",
            font,
            size,
            x,
            y,
            escape(text)
        ));
        self
    }

    /// Place a 1x1 image XObject scaled to 100x100 at (x, y)
    pub fn image(mut self, x: f64, y: f64) -> Self {
        let name = format!("Im{}", self.images.len() + 1);
        self.content
            .push_str(&format!("q 100 0 0 100 {} {} cm /{} Do Q\n", x, y, name));
        self.images.push(name);
        self
    }

    pub fn stroke_rect(mut self, rgb: (f64, f64, f64), x: f64, y: f64, w: f64, h: f64) -> Self {
        self.content.push_str(&format!(
            "{} {} {} RG {} {} {} {} re S\n",
            rgb.0, rgb.1, rgb.2, x, y, w, h
        ));
        self
    }

    pub fn fill_rect(mut self, rgb: (f64, f64, f64), x: f64, y: f64, w: f64, h: f64) -> Self {
        self.content.push_str(&format!(
            "{} {} {} rg {} {} {} {} re f\n",
            rgb.0, rgb.1, rgb.2, x, y, w, h
        ));
        self
    }

    pub fn line(mut self, x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        self.content
            .push_str(&format!("{} {} m {} {} l S\n", x0, y0, x1, y1));
        self
    }

    /// Append content stream operators verbatim
    pub fn raw(mut self, content: &str) -> Self {
        self.content.push_str(content);
        self.content.push('\n');
        self
    }

    /// Ruled grid of `rows` x `cols` cells, 100x20 each, anchored at (x, y)
    /// as its top-left corner. `cells` fills row-major; missing entries
    /// stay blank.
    pub fn table(mut self, x: f64, y: f64, rows: usize, cols: usize, cells: &[&str]) -> Self {
        let (cell_w, cell_h) = (100.0, 20.0);
        let width = cell_w * cols as f64;
        let height = cell_h * rows as f64;
        for r in 0..=rows {
            let ly = y - cell_h * r as f64;
            self = self.line(x, ly, x + width, ly);
        }
        for c in 0..=cols {
            let lx = x + cell_w * c as f64;
            self = self.line(lx, y, lx, y - height);
        }
        for (i, cell) in cells.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let (r, c) = (i / cols, i % cols);
            let tx = x + cell_w * c as f64 + 5.0;
            let ty = y - cell_h * (r as f64 + 1.0) + 5.0;
            self = self.text("Helvetica", 10.0, tx, ty, cell);
        }
        self
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Builder for a complete document
#[derive(Debug, Clone, Default)]
pub struct PdfBuilder {
    pages: Vec<PageSpec>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: PageSpec) -> Self {
        self.pages.push(page);
        self
    }

    /// Single line of Helvetica text
    pub fn text_page(self, text: &str, size: f64) -> Self {
        self.page(PageSpec::new().text("Helvetica", size, 72.0, 700.0, text))
    }

    pub fn empty_page(self) -> Self {
        self.page(PageSpec::new())
    }

    pub fn image_page(self) -> Self {
        self.page(PageSpec::new().image(100.0, 100.0))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0x80],
        ));

        let mut font_ids: Vec<(String, ObjectId)> = Vec::new();
        let mut page_ids = Vec::new();

        for spec in &self.pages {
            let mut fonts = Dictionary::new();
            for (name, base) in &spec.fonts {
                let id = match font_ids.iter().find(|(b, _)| b == base) {
                    Some((_, id)) => *id,
                    None => {
                        let id = doc.add_object(dictionary! {
                            "Type" => "Font",
                            "Subtype" => "Type1",
                            "BaseFont" => Object::Name(base.as_bytes().to_vec()),
                        });
                        font_ids.push((base.clone(), id));
                        id
                    }
                };
                fonts.set(name.as_bytes().to_vec(), Object::Reference(id));
            }

            let mut xobjects = Dictionary::new();
            for name in &spec.images {
                xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
            }

            let content_id = doc.add_object(Stream::new(
                Dictionary::new(),
                spec.content.clone().into_bytes(),
            ));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => fonts,
                    "XObject" => xobjects,
                },
            });
            page_ids.push(page_id);
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Count" => page_ids.len() as i64,
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .expect("in-memory PDF serialization cannot fail");
        buffer
    }
}
