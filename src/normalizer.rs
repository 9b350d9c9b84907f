// 🧭 Product Normalizer - two raw shapes → one CanonicalProduct
//
// Products reach us either as flat spreadsheet rows (one sheet per product
// family) or as relational records joined with their institution and
// category/subcategory. Both are reduced to the same intermediate field set,
// then a single builder applies defaults and produces the canonical record.
// A record is either fully built or rejected with a reason.

use crate::config::EngineConfig;
use crate::entities::{CanonicalProduct, ProductCategory, RatingSummary, Segment};
use crate::error::RowRejection;
use crate::fields::{
    generate_slug, metadata_value, parse_array_field, parse_interest_rate, parse_loan_term,
    parse_numeric_value, parse_pipe_list, RateRange, TermRange,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// RAW SHAPES
// ============================================================================

/// Columns the flat importer understands. Anything else goes to metadata.
pub const KNOWN_COLUMNS: &[&str] = &[
    "name",
    "tagline",
    "description",
    "provider",
    "institution",
    "category",
    "segment",
    "interestRate",
    "loanTerm",
    "maxLoanAmount",
    "fees",
    "eligibility",
    "features",
    "benefits",
    "detailsUrl",
    "aiHint",
    "imageUrl",
];

/// Metadata columns holding `|`-separated lists (family sheets)
pub const LIST_COLUMNS: &[&str] = &[
    "pros",
    "cons",
    "requisitos",
    "comisiones",
    "tiendas_participantes",
    "ideal_para",
    "costos_adicionales",
];

/// Metadata value for one extra column. List columns become arrays unless
/// the cell is already a JSON array; other cells go through `metadata_value`.
pub fn metadata_entry(header: &str, text: &str) -> serde_json::Value {
    let key = column_key(header);
    let is_list = LIST_COLUMNS.iter().any(|column| column_key(column) == key);

    if is_list && !text.trim_start().starts_with('[') {
        serde_json::Value::from(parse_pipe_list(text))
    } else {
        metadata_value(text)
    }
}

/// One spreadsheet row: header → cell text. No invariants.
///
/// Lookups ignore case, `_` and spaces in the header, so `interestRate`,
/// `interest_rate` and `Interest Rate` are the same column. Blank cells read
/// as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawImportRow {
    cells: BTreeMap<String, String>,
}

fn column_key(header: &str) -> String {
    header
        .chars()
        .filter(|c| *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

impl RawImportRow {
    pub fn new() -> Self {
        RawImportRow::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        RawImportRow {
            cells: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn insert(&mut self, header: impl Into<String>, value: impl Into<String>) {
        self.cells.insert(header.into(), value.into());
    }

    /// Trimmed, non-empty cell for a column
    pub fn get(&self, column: &str) -> Option<&str> {
        let wanted = column_key(column);
        self.cells
            .iter()
            .find(|(header, _)| column_key(header) == wanted)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Header as written in the sheet for a column, if present
    pub fn column_header(&self, column: &str) -> Option<&str> {
        let wanted = column_key(column);
        self.cells
            .keys()
            .find(|header| column_key(header) == wanted)
            .map(String::as_str)
    }

    /// Non-empty cells whose header is not a known column
    pub fn unknown_columns(&self) -> impl Iterator<Item = (&str, &str)> {
        let known: Vec<String> = KNOWN_COLUMNS.iter().map(|c| column_key(c)).collect();
        self.cells
            .iter()
            .filter(move |(header, value)| {
                !value.trim().is_empty() && !known.contains(&column_key(header))
            })
            .map(|(header, value)| (header.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.values().all(|v| v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstitutionRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryRef {
    pub id: Option<String>,
    pub slug: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubcategoryRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub category: Option<CategoryRef>,
}

/// A product as stored relationally, already joined with its institution and
/// subcategory → category. Numeric fields are split out; lists are arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalProduct {
    pub id: Option<String>,
    pub name: Option<String>,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub segment: Option<String>,
    pub benefits: Vec<String>,
    pub features: Vec<String>,
    #[serde(alias = "requirements")]
    pub eligibility: Vec<String>,
    pub interest_rate_min: Option<f64>,
    pub interest_rate_max: Option<f64>,
    pub term_min_months: Option<u32>,
    pub term_max_months: Option<u32>,
    pub max_amount: Option<f64>,
    pub fees: Option<String>,
    pub image_url: Option<String>,
    pub ai_hint: Option<String>,
    pub details_url: Option<String>,
    pub institution: Option<InstitutionRef>,
    pub subcategory: Option<SubcategoryRef>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Either raw shape, tagged by `kind` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawProduct {
    Flat(RawImportRow),
    Relational(RelationalProduct),
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl RawProduct {
    pub fn product_name(&self) -> Option<&str> {
        match self {
            RawProduct::Flat(row) => row.get("name"),
            RawProduct::Relational(rel) => non_empty(rel.name.as_ref()),
        }
    }

    /// Provider / institution display name, used for resolution
    pub fn provider_name(&self) -> Option<&str> {
        match self {
            RawProduct::Flat(row) => row.get("provider").or_else(|| row.get("institution")),
            RawProduct::Relational(rel) => rel
                .institution
                .as_ref()
                .and_then(|inst| non_empty(inst.name.as_ref())),
        }
    }

    /// Institution id already known to the source (relational joins only)
    pub fn institution_id_hint(&self) -> Option<&str> {
        match self {
            RawProduct::Flat(_) => None,
            RawProduct::Relational(rel) => rel
                .institution
                .as_ref()
                .and_then(|inst| non_empty(inst.id.as_ref())),
        }
    }

    /// Required: a name, plus a provider name or institution reference
    pub fn check_required(&self) -> Result<(), RowRejection> {
        let has_name = self.product_name().is_some();
        let has_provider = self.provider_name().is_some() || self.institution_id_hint().is_some();

        if has_name && has_provider {
            Ok(())
        } else {
            Err(RowRejection::missing_required_fields())
        }
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Everything normalization needs besides the row itself
#[derive(Debug, Clone)]
pub struct NormalizeContext<'a> {
    /// Already resolved through `resolver::resolve`
    pub institution_id: &'a str,

    /// Product family of the sheet; a relational record's own category wins
    pub category_key: Option<&'a str>,

    /// Appended to the name before slugging when set
    pub slug_disambiguator: Option<&'a str>,

    /// Institution name for records that only carry its id; shown in the
    /// placeholder image
    pub provider_label: Option<&'a str>,

    pub placeholder_image_base: &'a str,
    pub category_aliases: &'a HashMap<String, String>,
}

impl<'a> NormalizeContext<'a> {
    pub fn new(institution_id: &'a str, config: &'a EngineConfig) -> Self {
        NormalizeContext {
            institution_id,
            category_key: None,
            slug_disambiguator: None,
            provider_label: None,
            placeholder_image_base: &config.placeholder_image_base,
            category_aliases: &config.category_aliases,
        }
    }

    pub fn with_category(mut self, category_key: Option<&'a str>) -> Self {
        self.category_key = category_key;
        self
    }

    pub fn with_disambiguator(mut self, disambiguator: Option<&'a str>) -> Self {
        self.slug_disambiguator = disambiguator;
        self
    }

    pub fn with_provider_label(mut self, label: Option<&'a str>) -> Self {
        self.provider_label = label;
        self
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Shape-independent view of a raw product
#[derive(Debug, Default)]
struct ProductFields {
    name: Option<String>,
    provider: Option<String>,
    institution_ref: Option<String>,
    category_key: Option<String>,
    segment: Option<String>,
    tagline: Option<String>,
    description: Option<String>,
    benefits: Vec<String>,
    features: Vec<String>,
    rate: RateRange,
    term: TermRange,
    max_amount: Option<f64>,
    fees: Option<String>,
    eligibility: Vec<String>,
    image_url: Option<String>,
    ai_hint: Option<String>,
    details_url: Option<String>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn fields_from_flat(row: &RawImportRow) -> ProductFields {
    ProductFields {
        name: owned(row.get("name")),
        provider: owned(row.get("provider").or_else(|| row.get("institution"))),
        institution_ref: None,
        category_key: owned(row.get("category")),
        segment: owned(row.get("segment")),
        tagline: owned(row.get("tagline")),
        description: owned(row.get("description")),
        benefits: parse_array_field(row.get("benefits")),
        features: parse_array_field(row.get("features")),
        rate: row.get("interestRate").map(parse_interest_rate).unwrap_or_default(),
        term: row.get("loanTerm").map(parse_loan_term).unwrap_or_default(),
        max_amount: row.get("maxLoanAmount").and_then(parse_numeric_value),
        fees: owned(row.get("fees")),
        eligibility: parse_array_field(row.get("eligibility")),
        image_url: owned(row.get("imageUrl")),
        ai_hint: owned(row.get("aiHint")),
        details_url: owned(row.get("detailsUrl")),
        metadata: row
            .unknown_columns()
            .map(|(header, value)| (header.to_string(), metadata_entry(header, value)))
            .collect(),
    }
}

fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn fields_from_relational(rel: &RelationalProduct) -> ProductFields {
    let category_key = rel.subcategory.as_ref().and_then(|sub| {
        sub.category
            .as_ref()
            .and_then(|cat| non_empty(cat.slug.as_ref()).or_else(|| non_empty(cat.name.as_ref())))
            .or_else(|| non_empty(sub.name.as_ref()))
    });

    let institution = rel.institution.as_ref();

    ProductFields {
        name: owned(non_empty(rel.name.as_ref())),
        provider: owned(institution.and_then(|i| non_empty(i.name.as_ref()))),
        institution_ref: owned(institution.and_then(|i| non_empty(i.id.as_ref()))),
        category_key: owned(category_key),
        segment: owned(non_empty(rel.segment.as_ref())),
        tagline: owned(non_empty(rel.tagline.as_ref())),
        description: owned(non_empty(rel.description.as_ref())),
        benefits: clean_list(&rel.benefits),
        features: clean_list(&rel.features),
        rate: RateRange::new(
            rel.interest_rate_min.filter(|v| v.is_finite()),
            rel.interest_rate_max.filter(|v| v.is_finite()),
        ),
        term: TermRange::new(rel.term_min_months, rel.term_max_months),
        max_amount: rel.max_amount.filter(|v| v.is_finite()),
        fees: owned(non_empty(rel.fees.as_ref())),
        eligibility: clean_list(&rel.eligibility),
        image_url: owned(non_empty(rel.image_url.as_ref())),
        ai_hint: owned(non_empty(rel.ai_hint.as_ref())),
        details_url: owned(non_empty(rel.details_url.as_ref())),
        metadata: rel.metadata.clone(),
    }
}

/// Slug for a product name, with an optional disambiguator appended
pub fn product_slug(name: &str, disambiguator: Option<&str>) -> String {
    match disambiguator {
        Some(extra) if !extra.trim().is_empty() => generate_slug(&format!("{} {}", name, extra)),
        _ => generate_slug(name),
    }
}

/// Placeholder image that embeds the provider name; the bare base image when
/// the provider is unknown
pub fn placeholder_image_url(base: &str, provider: Option<&str>) -> String {
    let base = base.trim_end_matches(['?', '/']);
    match provider.map(str::trim).filter(|p| !p.is_empty()) {
        Some(provider) => format!("{}?text={}", base, urlencoding::encode(provider)),
        None => base.to_string(),
    }
}

/// Normalize either raw shape into a canonical product, or reject it.
pub fn normalize(
    raw: &RawProduct,
    ctx: &NormalizeContext<'_>,
) -> Result<CanonicalProduct, RowRejection> {
    raw.check_required()?;

    let fields = match raw {
        RawProduct::Flat(row) => fields_from_flat(row),
        RawProduct::Relational(rel) => fields_from_relational(rel),
    };

    build(fields, ctx)
}

fn build(fields: ProductFields, ctx: &NormalizeContext<'_>) -> Result<CanonicalProduct, RowRejection> {
    let name = fields.name.ok_or_else(RowRejection::missing_required_fields)?;
    if fields.provider.is_none() && fields.institution_ref.is_none() {
        return Err(RowRejection::missing_required_fields());
    }
    let provider_label = fields.provider.as_deref().or(ctx.provider_label);

    let category_key = fields.category_key.as_deref().or(ctx.category_key).unwrap_or("");
    let category = ProductCategory::from_key_with_aliases(category_key, ctx.category_aliases);

    let slug = product_slug(&name, ctx.slug_disambiguator);
    if slug.is_empty() {
        return Err(RowRejection::new("name has no URL-safe characters"));
    }

    let description = fields
        .description
        .or_else(|| fields.tagline.clone())
        .unwrap_or_else(|| format!("{} ({})", name, category.label()));

    let ai_hint = fields
        .ai_hint
        .unwrap_or_else(|| format!("{} {}", category.label(), name).to_lowercase());

    let image_url = fields
        .image_url
        .unwrap_or_else(|| placeholder_image_url(ctx.placeholder_image_base, provider_label));

    Ok(CanonicalProduct {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        slug,
        institution_id: ctx.institution_id.to_string(),
        category,
        segment: Segment::from_text(fields.segment.as_deref()),
        tagline: fields.tagline,
        description,
        benefits: fields.benefits,
        features: fields.features,
        rate_info: fields.rate.known(),
        term_info: fields.term.known(),
        max_amount: fields.max_amount,
        fees: fields.fees,
        eligibility: fields.eligibility,
        image_url,
        ai_hint,
        details_url: fields.details_url,
        rating: RatingSummary::default(),
        metadata: fields.metadata,
    })
}

// ============================================================================
// TESTS
// ============================================================================
