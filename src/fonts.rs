use lopdf::{Object, StringFormat};
use owned_ttf_parser::{AsFaceRef as _, Face, OwnedFace};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use unicode_normalization::UnicodeNormalization as _;

use crate::configuration::AssemblyConfiguration;
use crate::error::{ContextError, ErrorKind};

/// The name of the standard font used whenever no other font family is requested.
pub const STANDARD_FONT_FAMILY: &str = "Helvetica";

/// Advance widths of the Helvetica glyphs for the printable ASCII range (32 to 126),
/// in thousandths of the font size.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' ' to '/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0' to '?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@' to 'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P' to '_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`' to 'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p' to '~'
];

/// Advance widths of the Helvetica-Bold glyphs for the printable ASCII range. The oblique
/// variants share the widths of their upright counterparts.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' ' to '/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // '0' to '?'
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // '@' to 'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 'P' to '_'
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // '`' to 'o'
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 'p' to '~'
];

/// Width used for the Latin-1 supplement characters, whose exact metrics are not tabulated.
const HELVETICA_FALLBACK_WIDTH: u16 = 556;

/// Text converted into the bytes expected by a PDF `Tj` operator for a given font.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedText {
    pub bytes: Vec<u8>,
    pub format: StringFormat,
    /// The characters the font could not represent, which were replaced.
    pub missing_characters: Vec<char>,
}

impl EncodedText {
    pub fn into_object(self) -> Object {
        Object::String(self.bytes, self.format)
    }
}

/// A font face loaded from a TTF font, together with its measure of units per em.
#[derive(Clone, Debug)]
struct TtfFontFace {
    inner: Arc<OwnedFace>,
    units_per_em: u16,
}

impl TtfFontFace {
    fn from_bytes(data: &[u8]) -> Result<Self, ContextError> {
        let face = OwnedFace::from_vec(data.to_vec(), 0).map_err(|error| {
            ContextError::with_error(ErrorKind::Resource, "Failed to parse font", &error)
        })?;
        let units_per_em = face.as_face_ref().units_per_em();

        Ok(Self {
            inner: Arc::new(face),
            units_per_em,
        })
    }

    fn face(&self) -> &Face<'_> {
        self.inner.as_face_ref()
    }

    fn glyph_id(&self, character: char) -> Option<u16> {
        self.face()
            .glyph_index(character)
            .map(|glyph_id| glyph_id.0)
            .filter(|glyph_id| *glyph_id > 0)
    }

    /// Advance width of a glyph scaled to a 1000 units em square.
    fn glyph_width(&self, glyph_id: u16) -> Option<f32> {
        self.face()
            .glyph_hor_advance(owned_ttf_parser::GlyphId(glyph_id))
            .map(|advance| advance as f32 * 1000.0 / self.units_per_em as f32)
    }

    fn to_thousandths(&self, units: i16) -> i64 {
        (units as f32 * 1000.0 / self.units_per_em as f32) as i64
    }

    /// The association between glyph IDs and the characters they render, taken from the unicode cmap subtables.
    fn glyph_characters(&self) -> BTreeMap<u16, char> {
        let mut glyph_characters = BTreeMap::new();
        let Some(cmap) = self.face().tables().cmap else {
            return glyph_characters;
        };

        for subtable in cmap.subtables.into_iter().filter(|subtable| subtable.is_unicode()) {
            subtable.codepoints(|codepoint| {
                let Some(character) = char::from_u32(codepoint) else {
                    return;
                };
                if let Some(glyph_index) = subtable
                    .glyph_index(codepoint)
                    .filter(|glyph_index| glyph_index.0 > 0)
                {
                    glyph_characters.entry(glyph_index.0).or_insert(character);
                }
            });
        }

        glyph_characters
    }
}

/// The weight and slant a text run is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => FontStyle::Regular,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (true, true) => FontStyle::BoldItalic,
        }
    }

    pub fn is_bold(&self) -> bool {
        matches!(self, FontStyle::Bold | FontStyle::BoldItalic)
    }

    /// The suffix of the standard font name, and of the family name an embedded variant is
    /// registered under (`Helvetica-Bold`, `Noto Sans-BoldItalic`).
    fn suffix(&self) -> &'static str {
        match self {
            FontStyle::Regular => "",
            FontStyle::Bold => "-Bold",
            FontStyle::Italic => "-Italic",
            FontStyle::BoldItalic => "-BoldItalic",
        }
    }

    fn standard_suffix(&self) -> &'static str {
        match self {
            FontStyle::Regular => "",
            FontStyle::Bold => "-Bold",
            FontStyle::Italic => "-Oblique",
            FontStyle::BoldItalic => "-BoldOblique",
        }
    }
}

#[derive(Clone, Debug)]
enum FontKind {
    /// One of the standard 14 fonts, which every PDF reader provides, written with `WinAnsiEncoding`.
    Standard { style: FontStyle },
    /// An embedded TrueType font, written as a `Type0` font with the `Identity-H` encoding.
    TrueType { bytes: Vec<u8>, face: TtfFontFace },
}

/// A font family usable by text blocks, table cells and overlays.
#[derive(Clone, Debug)]
pub struct LoadedFont {
    family: String,
    kind: FontKind,
}

impl LoadedFont {
    pub fn helvetica() -> Self {
        LoadedFont::standard(FontStyle::Regular)
    }

    /// The standard Helvetica font in the given style (`Helvetica-Bold`, `Helvetica-Oblique`
    /// and `Helvetica-BoldOblique`).
    pub fn standard(style: FontStyle) -> Self {
        LoadedFont {
            family: format!("{}{}", STANDARD_FONT_FAMILY, style.standard_suffix()),
            kind: FontKind::Standard { style },
        }
    }

    /// Constructs a font from the raw data of a TTF (or TTF-flavoured OTF) file.
    pub fn from_ttf_bytes<S: Into<String>>(family: S, bytes: Vec<u8>) -> Result<Self, ContextError> {
        let family = family.into();
        let face = TtfFontFace::from_bytes(&bytes).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Resource,
                format!("Failed to load the font family {:?}", family),
                &error,
            )
        })?;

        Ok(LoadedFont {
            family,
            kind: FontKind::TrueType { bytes, face },
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, FontKind::TrueType { .. })
    }

    /// The distance from the baseline to the top of the tallest glyphs, as a fraction of the font size.
    pub fn ascent(&self) -> f32 {
        match &self.kind {
            FontKind::Standard { .. } => 0.718,
            FontKind::TrueType { face, .. } => {
                face.face().ascender() as f32 / face.units_per_em as f32
            }
        }
    }

    /// The distance from the baseline to the bottom of the descenders, as a positive fraction of the font size.
    pub fn descent(&self) -> f32 {
        match &self.kind {
            FontKind::Standard { .. } => 0.207,
            FontKind::TrueType { face, .. } => {
                -(face.face().descender() as f32) / face.units_per_em as f32
            }
        }
    }

    /// The width in points of the text written at the given size, after NFC normalization.
    pub fn text_width(&self, text: &str, font_size: f32) -> f32 {
        let thousandths: f32 = text
            .nfc()
            .map(|character| self.character_width(character))
            .sum();
        thousandths * font_size / 1000.0
    }

    fn character_width(&self, character: char) -> f32 {
        match &self.kind {
            FontKind::Standard { style } => {
                let widths = if style.is_bold() {
                    &HELVETICA_BOLD_WIDTHS
                } else {
                    &HELVETICA_WIDTHS
                };
                let width = match winansi_byte(character) {
                    Some(byte @ 32..=126) => widths[(byte - 32) as usize],
                    Some(_) => HELVETICA_FALLBACK_WIDTH,
                    None => widths[(b'?' - 32) as usize],
                };
                width as f32
            }
            FontKind::TrueType { face, .. } => face
                .glyph_id(character)
                .and_then(|glyph_id| face.glyph_width(glyph_id))
                .unwrap_or(0.0),
        }
    }

    /// Encodes the text for a `Tj` operator. Characters the font cannot represent are replaced
    /// (by `?` for the standard font, by the missing glyph for embedded fonts) and reported.
    pub fn encode(&self, text: &str) -> EncodedText {
        let mut missing_characters = Vec::new();
        match &self.kind {
            FontKind::Standard { .. } => {
                let bytes = text
                    .nfc()
                    .map(|character| {
                        winansi_byte(character).unwrap_or_else(|| {
                            missing_characters.push(character);
                            b'?'
                        })
                    })
                    .collect();
                EncodedText {
                    bytes,
                    format: StringFormat::Literal,
                    missing_characters,
                }
            }
            FontKind::TrueType { face, .. } => {
                let bytes = text
                    .nfc()
                    .flat_map(|character| {
                        let glyph_id = face.glyph_id(character).unwrap_or_else(|| {
                            missing_characters.push(character);
                            0
                        });
                        glyph_id.to_be_bytes()
                    })
                    .collect();
                EncodedText {
                    bytes,
                    format: StringFormat::Hexadecimal,
                    missing_characters,
                }
            }
        }
    }

    /// Inserts the font into the PDF document under the given resource name and returns the
    /// font dictionary to be referenced from the page resources.
    pub fn insert_into_document(
        &self,
        inner_document: &mut lopdf::Document,
        resource_name: &str,
    ) -> lopdf::Dictionary {
        use lopdf::Object::*;

        match &self.kind {
            FontKind::Standard { .. } => lopdf::Dictionary::from_iter(vec![
                ("Type", Name("Font".into())),
                ("Subtype", Name("Type1".into())),
                ("BaseFont", Name(self.family.clone().into_bytes())),
                ("Encoding", Name("WinAnsiEncoding".into())),
            ]),
            FontKind::TrueType { bytes, face } => {
                let base_font = format!("{}+{}", resource_name, sanitize_font_name(&self.family));
                let font_file = lopdf::Stream::new(
                    lopdf::Dictionary::from_iter(vec![("Length1", Integer(bytes.len() as i64))]),
                    bytes.clone(),
                );
                let font_file_id = inner_document.add_object(font_file);

                let bounding_box = face.face().global_bounding_box();
                let font_descriptor = lopdf::Dictionary::from_iter(vec![
                    ("Type", Name("FontDescriptor".into())),
                    ("FontName", Name(base_font.clone().into_bytes())),
                    ("Ascent", Integer(face.to_thousandths(face.face().ascender()))),
                    ("Descent", Integer(face.to_thousandths(face.face().descender()))),
                    ("CapHeight", Integer(face.to_thousandths(face.face().ascender()))),
                    ("ItalicAngle", Integer(0)),
                    // Symbolic, since the glyphs are addressed by identifier rather than by a standard encoding
                    ("Flags", Integer(4)),
                    ("StemV", Integer(80)),
                    (
                        "FontBBox",
                        Array(vec![
                            Integer(face.to_thousandths(bounding_box.x_min)),
                            Integer(face.to_thousandths(bounding_box.y_min)),
                            Integer(face.to_thousandths(bounding_box.x_max)),
                            Integer(face.to_thousandths(bounding_box.y_max)),
                        ]),
                    ),
                    ("FontFile2", Reference(font_file_id)),
                ]);
                let font_descriptor_id = inner_document.add_object(font_descriptor);

                // All glyphs are consecutive, so a single `first [w1 w2 ...]` entry covers the font
                let glyph_widths = (0..face.face().number_of_glyphs())
                    .map(|glyph_id| Integer(face.glyph_width(glyph_id).unwrap_or(0.0) as i64))
                    .collect();
                let descendant_font = lopdf::Dictionary::from_iter(vec![
                    ("Type", Name("Font".into())),
                    ("Subtype", Name("CIDFontType2".into())),
                    ("BaseFont", Name(base_font.clone().into_bytes())),
                    (
                        "CIDSystemInfo",
                        Dictionary(lopdf::Dictionary::from_iter(vec![
                            ("Registry", String("Adobe".into(), StringFormat::Literal)),
                            ("Ordering", String("Identity".into(), StringFormat::Literal)),
                            ("Supplement", Integer(0)),
                        ])),
                    ),
                    ("CIDToGIDMap", Name("Identity".into())),
                    ("DW", Integer(1000)),
                    ("W", Array(vec![Integer(0), Array(glyph_widths)])),
                    ("FontDescriptor", Reference(font_descriptor_id)),
                ]);

                let to_unicode = lopdf::Stream::new(
                    lopdf::Dictionary::new(),
                    generate_to_unicode_cmap(resource_name, &face.glyph_characters()).into_bytes(),
                );
                let to_unicode_id = inner_document.add_object(to_unicode);

                lopdf::Dictionary::from_iter(vec![
                    ("Type", Name("Font".into())),
                    ("Subtype", Name("Type0".into())),
                    ("BaseFont", Name(base_font.into_bytes())),
                    ("Encoding", Name("Identity-H".into())),
                    ("DescendantFonts", Array(vec![Dictionary(descendant_font)])),
                    ("ToUnicode", Reference(to_unicode_id)),
                ])
            }
        }
    }
}

/// Maps a character to its `WinAnsiEncoding` byte, for the printable ASCII and Latin-1 ranges.
fn winansi_byte(character: char) -> Option<u8> {
    match character {
        '\t' => Some(b' '),
        ' '..='~' | '\u{a0}'..='\u{ff}' => Some(character as u8),
        _ => None,
    }
}

/// PDF names cannot contain whitespace or delimiters, so they are dropped from the family name.
fn sanitize_font_name(family: &str) -> String {
    family
        .chars()
        .filter(|character| character.is_ascii_alphanumeric() || *character == '-')
        .collect()
}

/// Generates the `ToUnicode` CMap that lets readers extract text from glyph identifiers.
/// Mappings are grouped in blocks of at most 100 entries, as required by the CMap format.
fn generate_to_unicode_cmap(resource_name: &str, glyph_characters: &BTreeMap<u16, char>) -> String {
    let mut cmap = format!(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /{resource_name}-UTF16 def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n"
    );

    let entries: Vec<_> = glyph_characters.iter().collect();
    for block in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (glyph_id, character) in block {
            let mut utf16 = [0u16; 2];
            let unicode: String = character
                .encode_utf16(&mut utf16)
                .iter()
                .map(|unit| format!("{unit:04X}"))
                .collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", glyph_id, unicode));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );

    cmap
}

/// The fonts available to a composition, indexed by family name. The standard Helvetica
/// font is always available.
#[derive(Clone, Debug)]
pub struct FontRegistry {
    /// Helvetica in each `FontStyle`, in declaration order.
    standard: [LoadedFont; 4],
    fonts: HashMap<String, LoadedFont>,
}

impl Default for FontRegistry {
    fn default() -> Self {
        FontRegistry {
            standard: [
                FontStyle::Regular,
                FontStyle::Bold,
                FontStyle::Italic,
                FontStyle::BoldItalic,
            ]
            .map(LoadedFont::standard),
            fonts: HashMap::new(),
        }
    }
}

impl FontRegistry {
    /// Loads every font association of the configuration from disk.
    pub fn from_configuration(configuration: &AssemblyConfiguration) -> Result<Self, ContextError> {
        let mut registry = FontRegistry::default();
        for font_association in &configuration.font_associations {
            let font_bytes = std::fs::read(&font_association.font_file_path).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Resource,
                    format!(
                        "Failed to read the font file {:?}",
                        font_association.font_file_path
                    ),
                    &error,
                )
            })?;
            registry.register(LoadedFont::from_ttf_bytes(
                font_association.font_family.clone(),
                font_bytes,
            )?);
        }

        Ok(registry)
    }

    pub fn register(&mut self, font: LoadedFont) {
        log::debug!("Registered the font family {:?}", font.family());
        self.fonts.insert(font.family.clone(), font);
    }

    pub fn standard(&self) -> &LoadedFont {
        &self.standard[0]
    }

    /// Resolves a font family, falling back to the standard font when the family is unknown.
    /// The second element reports the unknown family so that the caller can raise a warning.
    pub fn resolve(&self, family: Option<&str>) -> (&LoadedFont, Option<String>) {
        match family {
            None | Some(STANDARD_FONT_FAMILY) => (self.standard(), None),
            Some(family) => match self.fonts.get(family) {
                Some(font) => (font, None),
                None => (self.standard(), Some(family.to_string())),
            },
        }
    }

    /// Resolves a family in a given style. The standard font has all four styles; an embedded
    /// family uses the variant registered as `<family>-Bold`, `<family>-Italic` or
    /// `<family>-BoldItalic`, and its regular face when there is none.
    pub fn resolve_styled(&self, family: Option<&str>, style: FontStyle) -> &LoadedFont {
        let (font, _) = self.resolve(family);
        match &font.kind {
            FontKind::Standard { .. } => &self.standard[style as usize],
            FontKind::TrueType { .. } => self
                .fonts
                .get(&format!("{}{}", font.family, style.suffix()))
                .unwrap_or(font),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helvetica_widths_follow_the_metrics() {
        let font = LoadedFont::helvetica();
        // 'H' is 722 and 'i' is 222 thousandths of the font size
        assert!((font.text_width("Hi", 10.0) - 9.44).abs() < 1e-4);
        assert_eq!(font.text_width("", 12.0), 0.0);
    }

    #[test]
    fn unsupported_characters_are_replaced_and_reported() {
        let encoded = LoadedFont::helvetica().encode("Café 水印");

        assert_eq!(encoded.bytes, b"Caf\xe9 ??".to_vec());
        assert_eq!(encoded.missing_characters, vec!['水', '印']);
        assert_eq!(encoded.format, StringFormat::Literal);
    }

    #[test]
    fn decomposed_characters_are_normalized_before_encoding() {
        // 'e' followed by a combining acute accent becomes a single 'é'
        let encoded = LoadedFont::helvetica().encode("e\u{301}");
        assert_eq!(encoded.bytes, vec![0xe9]);
        assert!(encoded.missing_characters.is_empty());
    }

    #[test]
    fn invalid_font_data_is_a_resource_error() {
        let error = LoadedFont::from_ttf_bytes("Broken", vec![0, 1, 2, 3]).unwrap_err();
        assert!(error.is_resource());
    }

    #[test]
    fn unknown_families_fall_back_to_the_standard_font() {
        let registry = FontRegistry::default();
        let (font, unknown_family) = registry.resolve(Some("Comic Sans"));

        assert_eq!(font.family(), STANDARD_FONT_FAMILY);
        assert_eq!(unknown_family.as_deref(), Some("Comic Sans"));
        assert!(registry.resolve(None).1.is_none());
    }

    #[test]
    fn styled_standard_fonts_have_their_own_names_and_widths() {
        let registry = FontRegistry::default();
        let bold = registry.resolve_styled(None, FontStyle::Bold);
        let italic = registry.resolve_styled(Some(STANDARD_FONT_FAMILY), FontStyle::Italic);

        assert_eq!(bold.family(), "Helvetica-Bold");
        assert_eq!(italic.family(), "Helvetica-Oblique");
        assert_eq!(
            registry.resolve_styled(None, FontStyle::BoldItalic).family(),
            "Helvetica-BoldOblique"
        );
        // 'b' is 611 thousandths in bold and 556 upright, the oblique keeps the upright widths
        assert!((bold.text_width("b", 10.0) - 6.11).abs() < 1e-4);
        assert_eq!(italic.text_width("b", 10.0), LoadedFont::helvetica().text_width("b", 10.0));
        assert_eq!(FontStyle::from_flags(true, true), FontStyle::BoldItalic);

        let mut document = lopdf::Document::with_version("1.7");
        let dictionary = bold.insert_into_document(&mut document, "F0");
        assert_eq!(
            dictionary.get(b"BaseFont").and_then(Object::as_name).unwrap(),
            b"Helvetica-Bold"
        );
    }

    #[test]
    fn embedded_fonts_encode_glyph_identifiers() {
        let font_bytes = std::fs::read(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/watermark-glyphs.ttf"),
        )
        .unwrap();
        let font = LoadedFont::from_ttf_bytes("Watermark", font_bytes).unwrap();
        let encoded = font.encode("水印示例!");

        assert!(font.is_embedded());
        assert_eq!(encoded.bytes, vec![0, 3, 0, 2, 0, 4, 0, 1, 0, 0]);
        assert_eq!(encoded.format, StringFormat::Hexadecimal);
        assert_eq!(encoded.missing_characters, vec!['!']);
        assert!((font.text_width("水印", 10.0) - 20.0).abs() < 1e-4);

        // Without a registered bold variant the regular face is used
        let mut registry = FontRegistry::default();
        registry.register(font);
        assert_eq!(
            registry.resolve_styled(Some("Watermark"), FontStyle::Bold).family(),
            "Watermark"
        );
    }

    #[test]
    fn cmap_blocks_hold_at_most_one_hundred_entries() {
        let glyph_characters: BTreeMap<u16, char> = (1..=150u16)
            .map(|glyph_id| (glyph_id, char::from_u32(0x4e00 + glyph_id as u32).unwrap()))
            .collect();
        let cmap = generate_to_unicode_cmap("F1", &glyph_characters);

        assert!(cmap.contains("100 beginbfchar"));
        assert!(cmap.contains("50 beginbfchar"));
        assert!(cmap.contains("<0001> <4E01>"));
    }
}
