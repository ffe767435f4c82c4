//! Safety-sign appendix: registry tables per zone and the optional image grid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::assets::ImageStore;
use crate::frame::PageFlow;
use crate::layout::{Element, Role, Stroke};
use crate::markup::{Block, TableBlock};
use crate::render::{
    RenderContext, RenderOptions, render_block, render_sub_heading_keeping, single_line_at, text_at,
};
use crate::style::{FontWeight, Palette, TextAlignMode, TextStyle};
use crate::types::{Pt, Rect};

pub const LOCATION_PLACEHOLDER: &str = "[DA DEFINIRE]";
pub const NORM_PLACEHOLDER: &str = "[DA COMPILARE]";

const GRID_COLUMNS: i32 = 3;
const GRID_GAP: f32 = 10.0;
const CAPTION_HEIGHT: f32 = 22.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Zone {
    Ingresso,
    Dpi,
    Lavoro,
    Emergenza,
    Antincendio,
}

impl Zone {
    pub const ORDER: [Zone; 5] = [
        Zone::Ingresso,
        Zone::Dpi,
        Zone::Lavoro,
        Zone::Emergenza,
        Zone::Antincendio,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Zone::Ingresso => "INGRESSO",
            Zone::Dpi => "DPI",
            Zone::Lavoro => "LAVORO",
            Zone::Emergenza => "EMERGENZA",
            Zone::Antincendio => "ANTINCENDIO",
        }
    }

    pub fn parse(raw: &str) -> Option<Zone> {
        let raw = raw.trim();
        Zone::ORDER
            .into_iter()
            .find(|zone| zone.label().eq_ignore_ascii_case(raw))
    }
}

/// One selected sign with its placement metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sign {
    pub path: PathBuf,
    pub name: String,
    pub category: String,
    pub zone: String,
    pub location: Option<String>,
    pub norm: Option<String>,
}

impl Sign {
    pub fn zone(&self) -> Option<Zone> {
        Zone::parse(&self.zone)
    }

    /// File-style name without a trailing `.jpg`.
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        let cut = name.len().saturating_sub(4);
        match (name.get(..cut), name.get(cut..)) {
            (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(".jpg") => stem,
            _ => name,
        }
    }
}

fn or_placeholder(value: Option<&str>, placeholder: &str) -> String {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text.replace('\n', " "),
        _ => placeholder.to_string(),
    }
}

/// Signs grouped by zone in the fixed zone order; zones without signs are left out.
pub fn group_by_zone(signs: &[Sign]) -> Vec<(Zone, Vec<&Sign>)> {
    for sign in signs.iter().filter(|s| s.zone().is_none()) {
        log::warn!(
            "sign {:?} has unknown zone {:?}; left out of the appendix",
            sign.name,
            sign.zone
        );
    }
    Zone::ORDER
        .into_iter()
        .filter_map(|zone| {
            let members: Vec<&Sign> = signs.iter().filter(|s| s.zone() == Some(zone)).collect();
            (!members.is_empty()).then_some((zone, members))
        })
        .collect()
}

/// Registry rows for one zone, numbered from `first_number`.
pub fn registry_table(signs: &[&Sign], first_number: usize) -> TableBlock {
    let mut rows = vec![
        ["Nr.", "Cartello", "Categoria", "Ubicazione raccomandata", "Rif. normativo"]
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>(),
    ];
    for (offset, sign) in signs.iter().enumerate() {
        rows.push(vec![
            (first_number + offset).to_string(),
            sign.display_name().to_string(),
            sign.category.trim().to_string(),
            or_placeholder(sign.location.as_deref(), LOCATION_PLACEHOLDER),
            or_placeholder(sign.norm.as_deref(), NORM_PLACEHOLDER),
        ]);
    }
    TableBlock { rows }
}

/// Forces a new page and lays out the appendix. `images` enables the grid.
pub fn render_appendix(
    flow: &mut PageFlow,
    ctx: RenderContext,
    signs: &[Sign],
    mut images: Option<&mut ImageStore>,
) {
    if signs.is_empty() {
        return;
    }
    flow.new_page("sign appendix");
    let options = RenderOptions {
        emergency_grid: false,
    };
    let groups = group_by_zone(signs);
    render_block(
        flow,
        ctx,
        &Block::SectionBanner {
            number: "A".to_string(),
            title: "SEGNALETICA DI SICUREZZA".to_string(),
        },
        &options,
    );

    let mut number = 1;
    for (zone, members) in &groups {
        render_block(
            flow,
            ctx,
            &Block::SubHeading {
                text: zone.label().to_string(),
            },
            &options,
        );
        render_block(flow, ctx, &Block::Table(registry_table(members, number)), &options);
        number += members.len();
    }

    if let Some(store) = images.as_deref_mut() {
        for (zone, members) in &groups {
            render_zone_images(flow, ctx, *zone, members, store);
        }
    }
}

/// Heading plus grid; the heading only stays on a page that also holds the first row.
fn render_zone_images(
    flow: &mut PageFlow,
    ctx: RenderContext,
    zone: Zone,
    members: &[&Sign],
    store: &mut ImageStore,
) {
    let (_, _, tile_h) = tile_geometry(ctx);
    let heading = format!("Cartelli - {}", zone.label());
    render_sub_heading_keeping(flow, ctx, &heading, tile_h);
    render_image_grid(flow, ctx, members, store);
}

/// Tile width, image frame height and full tile height including the caption.
fn tile_geometry(ctx: RenderContext) -> (Pt, Pt, Pt) {
    let gap = Pt::from_f32(GRID_GAP);
    let tile_w = (ctx.width - gap * (GRID_COLUMNS - 1)) / GRID_COLUMNS;
    let frame_h = tile_w.mul_ratio(3, 4);
    (tile_w, frame_h, frame_h + Pt::from_f32(CAPTION_HEIGHT))
}

fn render_image_grid(flow: &mut PageFlow, ctx: RenderContext, signs: &[&Sign], store: &mut ImageStore) {
    let gap = Pt::from_f32(GRID_GAP);
    let (tile_w, frame_h, tile_h) = tile_geometry(ctx);

    for row in signs.chunks(GRID_COLUMNS as usize) {
        if !flow.fits(tile_h) {
            flow.new_page("image grid");
        }
        let y = flow.cursor();
        for (col, sign) in row.iter().enumerate() {
            let x = ctx.left + (tile_w + gap) * col as i32;
            flow.push(image_tile(x, y, tile_w, frame_h, sign, store));
        }
        flow.advance(tile_h + gap);
    }
}

fn image_tile(x: Pt, y: Pt, width: Pt, frame_h: Pt, sign: &Sign, store: &mut ImageStore) -> Element {
    let frame = Rect::new(x, y, width, frame_h);
    let mut children = vec![Element::Rect {
        rect: frame,
        radius: Pt::from_i32(3),
        fill: Some(Palette::WHITE),
        stroke: Some(Stroke::new(Palette::LINE, 0.5)),
    }];
    match store.load_image(&sign.path) {
        Ok(handle) => {
            let pad = Pt::from_i32(6);
            let box_w = width - pad * 2;
            let box_h = frame_h - pad * 2;
            let ratio = handle.aspect_ratio();
            let (w, h) = if box_w.to_f32() / box_h.to_f32().max(1.0) > ratio {
                (box_h * ratio, box_h)
            } else {
                (box_w, box_w * (1.0 / ratio.max(f32::EPSILON)))
            };
            children.push(Element::Image {
                rect: Rect::new(x + (width - w) / 2, y + (frame_h - h) / 2, w, h),
                resource_id: handle.id,
            });
        }
        Err(err) => {
            log::warn!("sign image {:?} replaced by a placeholder: {err}", sign.name);
            let inset = Pt::from_i32(12);
            children.push(Element::Rect {
                rect: Rect::new(x + inset, y + inset, width - inset * 2, frame_h - inset * 2),
                radius: Pt::from_i32(2),
                fill: Some(Palette::SECTION_BG),
                stroke: Some(Stroke::new(Palette::TEXT_GRAY, 0.5)),
            });
            let style = TextStyle::new(8.0, FontWeight::Regular, Palette::TEXT_GRAY)
                .with_align(TextAlignMode::Center);
            children.push(Element::Text(single_line_at(
                x + inset,
                y + frame_h / 2 - Pt::from_i32(5),
                width - inset * 2,
                style,
                "Immagine non disponibile",
            )));
        }
    }
    let caption = TextStyle::new(8.0, FontWeight::Regular, Palette::TEXT)
        .with_align(TextAlignMode::Center)
        .with_line_gap(0.0);
    let mut label = text_at(x, y + frame_h + Pt::from_i32(3), width, caption, sign.display_name());
    label.lines.truncate(2);
    children.push(Element::Text(label));
    Element::Group {
        role: Role::ImageTile,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FlowConfig;
    use crate::layout::Element;

    fn sign(name: &str, zone: &str) -> Sign {
        Sign {
            path: PathBuf::from(format!("/nonexistent/{name}")),
            name: name.to_string(),
            category: "Cartelli fondo blu (obbligo)".to_string(),
            zone: zone.to_string(),
            location: None,
            norm: Some("D.lgs 81/2008 All. XXV".to_string()),
        }
    }

    #[test]
    fn zones_follow_fixed_order_regardless_of_input() {
        let signs = vec![
            sign("Estintore.jpg", "ANTINCENDIO"),
            sign("Casco.jpg", "dpi"),
            sign("Cartello generale.jpg", "INGRESSO"),
            sign("Guanti.jpg", "DPI"),
            sign("Sconosciuto.jpg", "TETTO"),
        ];
        let groups = group_by_zone(&signs);
        let zones: Vec<Zone> = groups.iter().map(|(z, _)| *z).collect();
        assert_eq!(zones, vec![Zone::Ingresso, Zone::Dpi, Zone::Antincendio]);
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn registry_rows_use_placeholders_and_strip_extension() {
        let signs = [sign("Casco.JPG", "DPI")];
        let refs: Vec<&Sign> = signs.iter().collect();
        let table = registry_table(&refs, 4);
        assert_eq!(table.column_count(), 5);
        assert_eq!(
            table.rows[1],
            vec![
                "4",
                "Casco",
                "Cartelli fondo blu (obbligo)",
                LOCATION_PLACEHOLDER,
                "D.lgs 81/2008 All. XXV"
            ]
        );
    }

    #[test]
    fn multibyte_names_keep_their_characters() {
        assert_eq!(sign("Estintore nº123", "ANTINCENDIO").display_name(), "Estintore nº123");
        assert_eq!(sign("Uscita → E1", "EMERGENZA").display_name(), "Uscita → E1");
        assert_eq!(sign("Freccia →.jpg", "EMERGENZA").display_name(), "Freccia →");
        assert_eq!(sign("nº", "DPI").display_name(), "nº");

        let signs = [sign("Uscita → E1", "EMERGENZA"), sign("Estintore nº123", "ANTINCENDIO")];
        let refs: Vec<&Sign> = signs.iter().collect();
        let table = registry_table(&refs, 1);
        assert_eq!(table.rows[1][1], "Uscita → E1");
        assert_eq!(table.rows[2][1], "Estintore nº123");
    }

    #[test]
    fn sign_records_deserialize_with_defaults() {
        let parsed: Sign =
            serde_json::from_str(r#"{"path":"/x/Casco.jpg","name":"Casco.jpg","zone":"DPI"}"#)
                .expect("sign json");
        assert_eq!(parsed.zone(), Some(Zone::Dpi));
        assert_eq!(parsed.location, None);
        assert_eq!(parsed.category, "");
    }

    #[test]
    fn appendix_numbers_continue_and_headings_are_unique() {
        let signs = vec![
            sign("Estintore.jpg", "ANTINCENDIO"),
            sign("Cartello generale.jpg", "INGRESSO"),
            sign("Guanti.jpg", "DPI"),
        ];
        let mut flow = PageFlow::new(FlowConfig::default());
        let ctx = RenderContext::for_flow(&flow);
        render_appendix(&mut flow, ctx, &signs, None);
        let pages = flow.finish();
        let texts: Vec<String> = pages.iter().flat_map(|p| p.texts()).collect();
        let position = |needle: &str| texts.iter().position(|t| t == needle).expect(needle);
        assert!(position("INGRESSO") < position("DPI"));
        assert!(position("DPI") < position("ANTINCENDIO"));
        assert_eq!(texts.iter().filter(|t| *t == "DPI").count(), 1);
        assert!(position("Cartello generale") < position("Guanti"));
        assert!(texts.iter().any(|t| t == "3"));
        assert!(texts.iter().any(|t| t == LOCATION_PLACEHOLDER));
        assert_eq!(pages[0].count_role(Role::ImageTile), 0);
    }

    #[test]
    fn unreadable_images_become_placeholder_tiles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("Casco.png");
        std::fs::write(&good, crate::assets::tests::png_bytes(8, 8, [0, 80, 160, 255]))
            .expect("write png");
        let mut ok = sign("Casco.jpg", "DPI");
        ok.path = good;
        let signs = vec![ok, sign("Mancante.jpg", "DPI")];

        let mut store = ImageStore::new();
        let mut flow = PageFlow::new(FlowConfig::default());
        let ctx = RenderContext::for_flow(&flow);
        render_appendix(&mut flow, ctx, &signs, Some(&mut store));
        let pages = flow.finish();

        let tiles: Vec<&Element> = pages
            .iter()
            .flat_map(|p| p.elements.iter())
            .filter(|e| matches!(e, Element::Group { role: Role::ImageTile, .. }))
            .collect();
        assert_eq!(tiles.len(), 2);
        let has_image = |tile: &Element| match tile {
            Element::Group { children, .. } => {
                children.iter().any(|c| matches!(c, Element::Image { .. }))
            }
            _ => false,
        };
        assert!(has_image(tiles[0]));
        assert!(!has_image(tiles[1]));
        assert!(pages.iter().any(|p| p.contains_text("Immagine non disponibile")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn image_heading_moves_with_the_first_row() {
        let signs = [sign("Casco.jpg", "DPI")];
        let refs: Vec<&Sign> = signs.iter().collect();
        let mut store = ImageStore::new();
        let mut flow = PageFlow::new(FlowConfig::default());
        let ctx = RenderContext::for_flow(&flow);
        render_block(
            &mut flow,
            ctx,
            &Block::SubHeading {
                text: "Premessa".to_string(),
            },
            &RenderOptions::default(),
        );
        flow.advance(flow.remaining() - Pt::from_i32(60));
        render_zone_images(&mut flow, ctx, Zone::Dpi, &refs, &mut store);
        let pages = flow.finish();
        assert_eq!(pages.len(), 2);
        assert!(!pages[0].contains_text("Cartelli - "));
        assert!(pages[1].contains_text("Cartelli - "));
        assert_eq!(pages[1].count_role(Role::ImageTile), 1);
    }
}
