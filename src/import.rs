// 📥 Batch Import - spreadsheet rows / relational records → stored products
//
// Per row: required fields → institution → normalize → slug → upsert.
// A row that fails any step is reported with its 1-based index and the batch
// keeps going. Nothing here aborts a whole import because of one row.
//
// Family sheets (investment / credit / financing details) are a second pass:
// each row names an existing product and only adds metadata to it.

use crate::config::EngineConfig;
use crate::entities::CanonicalProduct;
use crate::error::{EngineError, Result, RowRejection};
use crate::normalizer::{
    metadata_entry, normalize, product_slug, NormalizeContext, RawImportRow, RawProduct,
    RelationalProduct,
};
use crate::resolver::{resolve, InstitutionCache, InstitutionStore};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, info_span, warn};

/// Give up on disambiguating a slug after this many candidates
const MAX_SLUG_ATTEMPTS: usize = 1000;

/// Columns that point a family-sheet row at a stored product. `id_producto`
/// and `id` take a product id (or its slug); `slug` takes a slug.
const PRODUCT_KEY_COLUMNS: &[&str] = &["id_producto", "id", "slug"];

/// A product as persisted, with the hash of its imported content
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProduct {
    pub product: CanonicalProduct,
    pub content_hash: String,
}

/// Store operations the importer needs
pub trait ProductStore {
    fn find_product_by_slug(&self, slug: &str) -> Result<Option<StoredProduct>>;

    fn find_product_by_id(&self, id: &str) -> Result<Option<StoredProduct>>;

    fn insert_product(&mut self, product: &CanonicalProduct, content_hash: &str) -> Result<()>;

    /// Rewrite an existing product's content; its rating summary is left alone
    fn update_product(&mut self, product: &CanonicalProduct, content_hash: &str) -> Result<()>;
}

// ============================================================================
// LOADERS
// ============================================================================

/// Read one sheet (CSV with a header row). Blank cells are kept and read as
/// absent later; ragged rows are accepted.
pub fn load_rows(csv_path: &Path) -> Result<Vec<RawImportRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(csv_path)?;

    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();

    for record in rdr.records() {
        let record = record?;
        rows.push(RawImportRow::from_pairs(
            headers.iter().zip(record.iter()),
        ));
    }

    debug!(path = %csv_path.display(), rows = rows.len(), "sheet loaded");
    Ok(rows)
}

/// One element of a JSON import: a product, or why it could not be read
pub type RawRecord = std::result::Result<RawProduct, RowRejection>;

/// Read a JSON array of products. Elements carrying a `kind` tag are read as
/// either raw shape; untagged elements are relational records. An element
/// that does not fit is kept as a rejection so row numbers stay aligned.
pub fn load_relational(json_path: &Path) -> Result<Vec<RawRecord>> {
    let text = std::fs::read_to_string(json_path)?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&text)?;

    let records = values
        .into_iter()
        .map(|value| {
            let parsed = if value.get("kind").is_some() {
                serde_json::from_value::<RawProduct>(value)
            } else {
                serde_json::from_value::<RelationalProduct>(value).map(RawProduct::Relational)
            };
            parsed.map_err(|e| RowRejection::new(format!("unreadable record: {}", e)))
        })
        .collect();

    Ok(records)
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based position in the input
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows: {} inserted, {} updated, {} unchanged, {} failed",
            self.total,
            self.inserted,
            self.updated,
            self.unchanged,
            self.failed()
        )
    }

    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Inserted => self.inserted += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted,
    Updated,
    Unchanged,
}

// ============================================================================
// IMPORT RUN
// ============================================================================

/// Where a row's product lands: its slug, and the stored product it replaces
struct SlugAssignment {
    disambiguator: Option<String>,
    existing: Option<StoredProduct>,
}

/// One import run. Owns the run-scoped institution cache and the set of
/// slugs already taken by earlier rows of the run.
pub struct ImportRun<'a, S>
where
    S: ProductStore + InstitutionStore + ?Sized,
{
    store: &'a mut S,
    config: &'a EngineConfig,
    cache: InstitutionCache,
    claimed_slugs: HashSet<String>,
}

impl<'a, S> ImportRun<'a, S>
where
    S: ProductStore + InstitutionStore + ?Sized,
{
    pub fn new(store: &'a mut S, config: &'a EngineConfig) -> Self {
        ImportRun {
            store,
            config,
            cache: InstitutionCache::new(),
            claimed_slugs: HashSet::new(),
        }
    }

    /// Import one sheet. `family` is the sheet's product family (category key)
    /// and applies to rows without their own `category` column.
    pub fn import_rows(&mut self, family: &str, rows: Vec<RawImportRow>) -> ImportReport {
        let records = rows.into_iter().map(|row| Ok(RawProduct::Flat(row))).collect();
        self.run(Some(family), records)
    }

    pub fn import_products(&mut self, products: Vec<RawProduct>) -> ImportReport {
        self.run(None, products.into_iter().map(Ok).collect())
    }

    /// Like `import_products`, with load-time rejections reported in place
    pub fn import_records(&mut self, records: Vec<RawRecord>) -> ImportReport {
        self.run(None, records)
    }

    /// Apply a family sheet to products already imported. Each row is keyed
    /// by `id_producto` / `id` / `slug`; its other non-canonical columns are
    /// merged into the product's metadata, `|`-lists as arrays and JSON cells
    /// as JSON. Nothing is inserted: an unknown product fails its row.
    pub fn enrich_rows(&mut self, rows: Vec<RawImportRow>) -> ImportReport {
        let span = info_span!("enrich", rows = rows.len());
        let _guard = span.enter();

        let mut report = ImportReport {
            total: rows.len(),
            ..Default::default()
        };

        for (index, row) in rows.iter().enumerate() {
            let row_number = index + 1;
            match self.enrich_one(row) {
                Ok(outcome) => report.record(outcome),
                Err(reason) => {
                    warn!(row = row_number, reason = %reason, "row skipped");
                    report.errors.push(RowError {
                        row: row_number,
                        reason,
                    });
                }
            }
        }

        info!("{}", report.summary());
        report
    }

    fn run(&mut self, family: Option<&str>, records: Vec<RawRecord>) -> ImportReport {
        let span = info_span!("import", family = family.unwrap_or("mixed"), rows = records.len());
        let _guard = span.enter();

        let mut report = ImportReport {
            total: records.len(),
            ..Default::default()
        };

        for (index, record) in records.into_iter().enumerate() {
            let row = index + 1;
            let result = record
                .map_err(|rejection| rejection.reason)
                .and_then(|raw| self.import_one(&raw, family));

            match result {
                Ok(outcome) => report.record(outcome),
                Err(reason) => {
                    warn!(row, reason = %reason, "row skipped");
                    report.errors.push(RowError { row, reason });
                }
            }
        }

        info!("{}", report.summary());
        report
    }

    fn import_one(&mut self, raw: &RawProduct, family: Option<&str>) -> std::result::Result<RowOutcome, String> {
        raw.check_required().map_err(|rejection| rejection.reason)?;

        let (institution_id, provider_label) = self.institution_for(raw)?;
        let name = raw
            .product_name()
            .ok_or_else(|| RowRejection::missing_required_fields().reason)?;

        let assignment = self
            .assign_slug(name, raw.provider_name(), &institution_id)
            .map_err(|e| format!("slug lookup failed: {}", e))?;

        let ctx = NormalizeContext::new(&institution_id, self.config)
            .with_category(family)
            .with_disambiguator(assignment.disambiguator.as_deref())
            .with_provider_label(provider_label.as_deref());
        let mut product = normalize(raw, &ctx).map_err(|rejection| rejection.reason)?;

        self.claimed_slugs.insert(product.slug.clone());

        let outcome = match assignment.existing {
            Some(existing) => {
                // Family-sheet columns are not in the base row; keep them
                for (key, value) in &existing.product.metadata {
                    product
                        .metadata
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }

                let content_hash = product.content_fingerprint();
                if existing.content_hash == content_hash {
                    RowOutcome::Unchanged
                } else {
                    product.id = existing.product.id;
                    product.rating = existing.product.rating;
                    self.store
                        .update_product(&product, &content_hash)
                        .map_err(|e| format!("could not update '{}': {}", product.slug, e))?;
                    RowOutcome::Updated
                }
            }
            None => {
                let content_hash = product.content_fingerprint();
                self.store
                    .insert_product(&product, &content_hash)
                    .map_err(|e| format!("could not insert '{}': {}", product.slug, e))?;
                RowOutcome::Inserted
            }
        };

        debug!(slug = %product.slug, ?outcome, "row imported");
        Ok(outcome)
    }

    /// Provider name → resolver. A relational record with only an institution
    /// id uses that id as is, and the institution's name when the store has it.
    fn institution_for(&mut self, raw: &RawProduct) -> std::result::Result<(String, Option<String>), String> {
        match (raw.provider_name(), raw.institution_id_hint()) {
            (Some(name), _) => resolve(&mut *self.store, name, &mut self.cache)
                .map(|id| (id, None))
                .map_err(|e| format!("institution '{}' could not be resolved: {}", name, e)),
            (None, Some(id)) => {
                let label = match self.store.find_institution_by_id(id) {
                    Ok(found) => found.map(|institution| institution.name),
                    Err(e) => {
                        debug!(institution_id = id, error = %e, "institution name lookup failed");
                        None
                    }
                };
                Ok((id.to_string(), label))
            }
            (None, None) => Err(RowRejection::missing_required_fields().reason),
        }
    }

    fn enrich_one(&mut self, row: &RawImportRow) -> std::result::Result<RowOutcome, String> {
        let stored = self.find_keyed_product(row)?;
        let mut product = stored.product;

        let key_columns: Vec<&str> = PRODUCT_KEY_COLUMNS
            .iter()
            .filter_map(|column| row.column_header(column))
            .collect();

        for (header, value) in row.unknown_columns() {
            if key_columns.contains(&header) {
                continue;
            }
            product
                .metadata
                .insert(header.to_string(), metadata_entry(header, value));
        }

        let content_hash = product.content_fingerprint();
        if content_hash == stored.content_hash {
            return Ok(RowOutcome::Unchanged);
        }

        self.store
            .update_product(&product, &content_hash)
            .map_err(|e| format!("could not update '{}': {}", product.slug, e))?;
        debug!(slug = %product.slug, "product enriched");
        Ok(RowOutcome::Updated)
    }

    /// `id_producto` / `id` match a product id, then a slug; `slug` a slug
    fn find_keyed_product(&self, row: &RawImportRow) -> std::result::Result<StoredProduct, String> {
        let lookup_failed = |e: EngineError| format!("product lookup failed: {}", e);

        if let Some(key) = row.get("id_producto").or_else(|| row.get("id")) {
            if let Some(stored) = self.store.find_product_by_id(key).map_err(lookup_failed)? {
                return Ok(stored);
            }
            return self
                .store
                .find_product_by_slug(key)
                .map_err(lookup_failed)?
                .ok_or_else(|| format!("no product with id or slug '{}'", key));
        }

        match row.get("slug") {
            Some(slug) => self
                .store
                .find_product_by_slug(slug)
                .map_err(lookup_failed)?
                .ok_or_else(|| format!("no product with slug '{}'", slug)),
            None => Err("missing product key (id_producto, id or slug)".to_string()),
        }
    }

    /// First free slug among `name`, `name-provider`, `name-provider-2`, ...
    ///
    /// A slug is free if no earlier row of this run took it and it is either
    /// unused in the store or held by a product of the same institution (that
    /// product is then updated in place).
    fn assign_slug(&self, name: &str, provider: Option<&str>, institution_id: &str) -> Result<SlugAssignment> {
        for attempt in 0..MAX_SLUG_ATTEMPTS {
            let disambiguator = match (attempt, provider) {
                (0, _) => None,
                (1, Some(provider)) => Some(provider.to_string()),
                (n, Some(provider)) => Some(format!("{} {}", provider, n)),
                (n, None) => Some((n + 1).to_string()),
            };

            let slug = product_slug(name, disambiguator.as_deref());
            if slug.is_empty() {
                // normalize() rejects the row with a proper reason
                return Ok(SlugAssignment {
                    disambiguator: None,
                    existing: None,
                });
            }
            if self.claimed_slugs.contains(&slug) {
                continue;
            }

            match self.store.find_product_by_slug(&slug)? {
                None => {
                    return Ok(SlugAssignment {
                        disambiguator,
                        existing: None,
                    })
                }
                Some(stored) if stored.product.institution_id == institution_id => {
                    return Ok(SlugAssignment {
                        disambiguator,
                        existing: Some(stored),
                    })
                }
                Some(_) => continue,
            }
        }

        Err(EngineError::InvalidInput(format!(
            "no free slug for '{}' after {} attempts",
            name, MAX_SLUG_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::entities::{Institution, ProductCategory, RatingSummary};
    use crate::normalizer::InstitutionRef;
    use crate::ratings::ReviewStore;
    use std::io::Write;

    const SHEET: &str = "\
name,provider,tagline,interestRate,loanTerm,maxLoanAmount,features,cat
Crédito Simple,BBVA,Tu préstamo,12% - 24%,12-60 meses,\"$500,000\",Sin aval|Pago fijo,31.2%
,Banorte,Sin nombre,10%,12,,,
Préstamo Nómina,Banorte,Para tu quincena,desde 9.9%,6 - 48,\"$300,000\",Descuento vía nómina,
";

    fn write_sheet(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn flat(name: &str, provider: &str, tagline: &str) -> RawImportRow {
        RawImportRow::from_pairs([("name", name), ("provider", provider), ("tagline", tagline)])
    }

    #[test]
    fn test_load_rows_reads_headers() {
        let file = write_sheet(SHEET);
        let rows = load_rows(file.path()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("name"), Some("Crédito Simple"));
        assert_eq!(rows[0].get("interest_rate"), Some("12% - 24%"));
        assert_eq!(rows[1].get("name"), None, "blank cell reads as absent");
    }

    #[test]
    fn test_bad_row_is_reported_and_batch_continues() {
        let file = write_sheet(SHEET);
        let rows = load_rows(file.path()).unwrap();
        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let report = ImportRun::new(&mut store, &config).import_rows("prestamos", rows);

        assert_eq!(report.total, 3);
        assert_eq!(report.inserted, 2);
        assert_eq!(
            report.errors,
            vec![RowError {
                row: 2,
                reason: "missing required fields".to_string()
            }]
        );
        assert_eq!(store.count_products().unwrap(), 2);

        let product = store.get_product_by_slug("credito-simple").unwrap().unwrap();
        assert_eq!(product.category, ProductCategory::Loans);
        assert_eq!(product.metadata["cat"], serde_json::json!("31.2%"));

        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_reimport_is_unchanged() {
        let file = write_sheet(SHEET);
        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let first = ImportRun::new(&mut store, &config)
            .import_rows("prestamos", load_rows(file.path()).unwrap());
        let second = ImportRun::new(&mut store, &config)
            .import_rows("prestamos", load_rows(file.path()).unwrap());

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(store.count_products().unwrap(), 2);
        assert_eq!(store.count_institutions().unwrap(), 2);
    }

    #[test]
    fn test_changed_row_updates_in_place() {
        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();

        ImportRun::new(&mut store, &config)
            .import_rows("credito", vec![flat("Tarjeta Oro", "Banamex", "Antes")]);
        let before = store.get_product_by_slug("tarjeta-oro").unwrap().unwrap();
        store
            .write_rating_summary(
                &before.id,
                &RatingSummary {
                    average_rating: 5.0,
                    approved_count: 1,
                },
            )
            .unwrap();

        let report = ImportRun::new(&mut store, &config)
            .import_rows("credito", vec![flat("Tarjeta Oro", "Banamex", "Después")]);
        assert_eq!(report.updated, 1);

        let after = store.get_product_by_slug("tarjeta-oro").unwrap().unwrap();
        assert_eq!(after.id, before.id, "identity survives an update");
        assert_eq!(after.tagline.as_deref(), Some("Después"));
        assert_eq!(after.rating.approved_count, 1);
    }

    #[test]
    fn test_same_name_other_institution_gets_provider_suffix() {
        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let report = ImportRun::new(&mut store, &config).import_rows(
            "credito",
            vec![flat("Tarjeta Clásica", "BBVA", "a"), flat("Tarjeta Clásica", "Banorte", "b")],
        );
        assert_eq!(report.inserted, 2);

        assert!(store.get_product_by_slug("tarjeta-clasica").unwrap().is_some());
        assert!(store.get_product_by_slug("tarjeta-clasica-banorte").unwrap().is_some());

        // A later run for Banorte alone still lands on its own slug
        let rerun = ImportRun::new(&mut store, &config)
            .import_rows("credito", vec![flat("Tarjeta Clásica", "Banorte", "b")]);
        assert_eq!(rerun.unchanged, 1);
        assert_eq!(store.count_products().unwrap(), 2);
    }

    #[test]
    fn test_duplicate_rows_in_one_run_get_numbered_slugs() {
        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let report = ImportRun::new(&mut store, &config).import_rows(
            "seguros",
            vec![
                flat("Seguro Auto", "GNP", "uno"),
                flat("Seguro Auto", "GNP", "dos"),
                flat("Seguro Auto", "GNP", "tres"),
            ],
        );

        assert_eq!(report.inserted, 3);
        for slug in ["seguro-auto", "seguro-auto-gnp", "seguro-auto-gnp-2"] {
            assert!(store.get_product_by_slug(slug).unwrap().is_some(), "{}", slug);
        }
        assert_eq!(store.count_institutions().unwrap(), 1);
    }

    #[test]
    fn test_relational_records() {
        let json = r#"[
            {
                "name": "Cuenta Digital",
                "tagline": "Sin comisiones",
                "requirements": ["INE"],
                "institution": {"name": "Nu"},
                "subcategory": {"name": "Débito", "category": {"slug": "banking"}}
            },
            {"name": 42},
            {
                "kind": "flat",
                "name": "Pagaré 28 días",
                "provider": "Nu",
                "category": "inversiones"
            },
            {
                "name": "Crédito PyME",
                "segment": "pymes",
                "institution": {"id": "inst-legacy-7"}
            }
        ]"#;
        let file = write_sheet(json);
        let records = load_relational(file.path()).unwrap();
        assert_eq!(records.len(), 4);
        assert!(records[1].is_err());

        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let report = ImportRun::new(&mut store, &config).import_records(records);

        assert_eq!(report.inserted, 3);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row, 2);
        assert!(report.errors[0].reason.starts_with("unreadable record"));

        let account = store.get_product_by_slug("cuenta-digital").unwrap().unwrap();
        assert_eq!(account.category, ProductCategory::Banking);
        assert_eq!(account.eligibility, vec!["INE".to_string()]);

        let note = store.get_product_by_slug("pagare-28-dias").unwrap().unwrap();
        assert_eq!(note.category, ProductCategory::Investments);
        assert_eq!(note.institution_id, account.institution_id);

        let legacy = store.get_product_by_slug("credito-pyme").unwrap().unwrap();
        assert_eq!(legacy.institution_id, "inst-legacy-7");
        assert_eq!(store.count_institutions().unwrap(), 1);
    }

    #[test]
    fn test_import_products_takes_both_shapes() {
        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let report = ImportRun::new(&mut store, &config).import_products(vec![
            RawProduct::Flat(flat("Tarjeta Joven", "HSBC", "x")),
            RawProduct::Relational(RelationalProduct {
                name: Some("Tarjeta 2Now".to_string()),
                institution: Some(InstitutionRef {
                    id: None,
                    name: Some("HSBC".to_string()),
                }),
                ..Default::default()
            }),
        ]);

        assert_eq!(report.inserted, 2);
        assert_eq!(store.count_institutions().unwrap(), 1);
    }

    /// Product store that works, institution store that cannot write
    struct ReadOnlyInstitutions(SqliteStore);

    impl InstitutionStore for ReadOnlyInstitutions {
        fn find_institution_by_name(&self, name: &str) -> Result<Option<Institution>> {
            self.0.find_institution_by_name(name)
        }

        fn insert_institution(&mut self, _institution: &Institution) -> Result<()> {
            Err(EngineError::InvalidInput("institutions are read-only".to_string()))
        }
    }

    impl ProductStore for ReadOnlyInstitutions {
        fn find_product_by_slug(&self, slug: &str) -> Result<Option<StoredProduct>> {
            self.0.find_product_by_slug(slug)
        }

        fn find_product_by_id(&self, id: &str) -> Result<Option<StoredProduct>> {
            self.0.find_product_by_id(id)
        }

        fn insert_product(&mut self, product: &CanonicalProduct, content_hash: &str) -> Result<()> {
            self.0.insert_product(product, content_hash)
        }

        fn update_product(&mut self, product: &CanonicalProduct, content_hash: &str) -> Result<()> {
            self.0.update_product(product, content_hash)
        }
    }

    #[test]
    fn test_institution_failure_fails_only_that_row() {
        let mut inner = SqliteStore::open_in_memory().unwrap();
        inner.insert_institution(&Institution::new("Santander")).unwrap();
        let mut store = ReadOnlyInstitutions(inner);
        let config = EngineConfig::default();

        let report = ImportRun::new(&mut store, &config).import_rows(
            "cuentas",
            vec![flat("Cuenta Nueva", "Fintech X", "a"), flat("Cuenta LikeU", "Santander", "b")],
        );

        assert_eq!(report.inserted, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row, 1);
        assert!(report.errors[0].reason.contains("Fintech X"));
    }

    #[test]
    fn test_id_only_record_uses_stored_institution_name() {
        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let azteca = Institution::new("Banco Azteca");
        store.insert_institution(&azteca).unwrap();

        let by_id = |name: &str, id: &str| {
            RawProduct::Relational(RelationalProduct {
                name: Some(name.to_string()),
                institution: Some(InstitutionRef {
                    id: Some(id.to_string()),
                    name: None,
                }),
                ..Default::default()
            })
        };

        let report = ImportRun::new(&mut store, &config).import_products(vec![
            by_id("Crédito Guardadito", &azteca.id),
            by_id("Préstamo Express", "inst-unknown"),
        ]);
        assert_eq!(report.inserted, 2);

        let known = store.get_product_by_slug("credito-guardadito").unwrap().unwrap();
        assert_eq!(known.image_url, "https://placehold.co/600x400.png?text=Banco%20Azteca");

        let unknown = store.get_product_by_slug("prestamo-express").unwrap().unwrap();
        assert_eq!(unknown.image_url, "https://placehold.co/600x400.png");
        assert!(!unknown.image_url.contains("Express"));
    }

    const FAMILY_SHEET: &str = "\
id_producto,requisitos,comisiones,pros,tips_raisket,contacto
tarjeta-oro,INE | Comprobante de domicilio,\"Anualidad $1,200|Reposición $150\",Puntos dobles|Sin anualidad el primer año,\"[\"\"Paga a tiempo\"\"]\",\"{\"\"tel\"\": \"\"55 1234 5678\"\"}\"
tarjeta-inexistente,INE,,,,
,INE,,,,
";

    #[test]
    fn test_family_sheet_enriches_existing_products() {
        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let base = vec![flat("Tarjeta Oro", "Banamex", "a"), flat("Fondo Plus", "GBM", "b")];
        ImportRun::new(&mut store, &config).import_rows("credito", base);
        let fund = store.get_product_by_slug("fondo-plus").unwrap().unwrap();

        let file = write_sheet(FAMILY_SHEET);
        let mut rows = load_rows(file.path()).unwrap();
        rows.push(RawImportRow::from_pairs([
            ("id_producto", fund.id.as_str()),
            ("ideal_para", "Ahorro a largo plazo|Principiantes"),
            ("name", "Ignorado"),
        ]));

        let report = ImportRun::new(&mut store, &config).enrich_rows(rows);

        assert_eq!(report.total, 4);
        assert_eq!(report.updated, 2);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].row, 2);
        assert!(report.errors[0].reason.contains("tarjeta-inexistente"));
        assert_eq!(report.errors[1].row, 3);
        assert!(report.errors[1].reason.starts_with("missing product key"));

        let card = store.get_product_by_slug("tarjeta-oro").unwrap().unwrap();
        assert_eq!(
            card.metadata["requisitos"],
            serde_json::json!(["INE", "Comprobante de domicilio"])
        );
        assert_eq!(
            card.metadata["comisiones"],
            serde_json::json!(["Anualidad $1,200", "Reposición $150"])
        );
        assert_eq!(
            card.metadata["pros"],
            serde_json::json!(["Puntos dobles", "Sin anualidad el primer año"])
        );
        assert_eq!(card.metadata["tips_raisket"], serde_json::json!(["Paga a tiempo"]));
        assert_eq!(card.metadata["contacto"], serde_json::json!({"tel": "55 1234 5678"}));
        assert!(!card.metadata.contains_key("id_producto"));
        assert_eq!(card.tagline.as_deref(), Some("a"));

        let fund = store.get_product_by_slug("fondo-plus").unwrap().unwrap();
        assert_eq!(
            fund.metadata["ideal_para"],
            serde_json::json!(["Ahorro a largo plazo", "Principiantes"])
        );
        assert_eq!(fund.name, "Fondo Plus", "canonical columns are not enriched");

        assert_eq!(store.count_products().unwrap(), 2);
        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_base_reimport_keeps_family_metadata() {
        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let base = vec![flat("Tarjeta Oro", "Banamex", "a")];

        ImportRun::new(&mut store, &config).import_rows("credito", base.clone());
        let family = vec![RawImportRow::from_pairs([("slug", "tarjeta-oro"), ("cons", "CAT alto")])];
        let enriched = ImportRun::new(&mut store, &config).enrich_rows(family.clone());
        assert_eq!(enriched.updated, 1);

        let again = ImportRun::new(&mut store, &config).enrich_rows(family);
        assert_eq!(again.unchanged, 1);

        let rerun = ImportRun::new(&mut store, &config).import_rows("credito", base);
        assert_eq!(rerun.unchanged, 1);

        let card = store.get_product_by_slug("tarjeta-oro").unwrap().unwrap();
        assert_eq!(card.metadata["cons"], serde_json::json!(["CAT alto"]));
    }

    #[test]
    fn test_name_without_slug_characters_is_rejected() {
        let config = EngineConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let report =
            ImportRun::new(&mut store, &config).import_rows("credito", vec![flat("¡¿!?", "BBVA", "x")]);

        assert_eq!(report.inserted, 0);
        assert_eq!(report.errors[0].reason, "name has no URL-safe characters");
    }
}
