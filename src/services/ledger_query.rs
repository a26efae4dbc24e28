// src/services/ledger_query.rs

//! Visões do razão de estoque: filtros e ordenações puros sobre um snapshot.
//!
//! Nada aqui guarda estado. Chamar duas vezes com o mesmo snapshot e os mesmos
//! argumentos devolve exatamente a mesma sequência.

use std::{cmp::Ordering, collections::HashMap};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{
    catalog::Product,
    stock::{Deduction, DeductionReason, DeductionView, ExpiryBucket, LotView, StockLot},
};

pub const DEFAULT_NEAR_EXPIRY_DAYS: u32 = 30;

// ---
// Argumentos
// ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Filtro por faixa de validade. `All` não filtra.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ExpiryFilter {
    #[default]
    All,
    Expired,
    NearExpiry,
    NoExpiry,
}

impl ExpiryFilter {
    fn bucket(&self) -> Option<ExpiryBucket> {
        match self {
            ExpiryFilter::All => None,
            ExpiryFilter::Expired => Some(ExpiryBucket::Expired),
            ExpiryFilter::NearExpiry => Some(ExpiryBucket::NearExpiry),
            ExpiryFilter::NoExpiry => Some(ExpiryBucket::NoExpiry),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum LotSortKey {
    #[default]
    ProductName,
    LotCode,
    Quantity,
    ExpiryDate,
    RegisteredAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LotSort {
    pub key: LotSortKey,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotFilter {
    pub search: Option<String>,
    pub product_id: Option<Uuid>,
    pub expiry: ExpiryFilter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum DeductionSortKey {
    #[default]
    OccurredAt,
    Quantity,
    ProductName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeductionSort {
    pub key: DeductionSortKey,
    pub direction: SortDirection,
}

impl Default for DeductionSort {
    // Histórico: mais recentes primeiro
    fn default() -> Self {
        DeductionSort {
            key: DeductionSortKey::OccurredAt,
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeductionFilter {
    pub lot_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub principal_id: Option<Uuid>,
    pub reason: Option<DeductionReason>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

// ---
// Faixa de validade
// ---

/// Classifica a validade em relação a `today` (já alinhado à meia-noite local).
///
/// Validades depois da janela não caem em faixa nenhuma.
pub fn expiry_bucket(
    expiry_date: Option<NaiveDate>,
    today: NaiveDate,
    near_expiry_days: u32,
) -> Option<ExpiryBucket> {
    let Some(expiry) = expiry_date else {
        return Some(ExpiryBucket::NoExpiry);
    };

    if expiry < today {
        return Some(ExpiryBucket::Expired);
    }

    let limit = today
        .checked_add_days(Days::new(u64::from(near_expiry_days)))
        .unwrap_or(NaiveDate::MAX);
    if expiry <= limit {
        Some(ExpiryBucket::NearExpiry)
    } else {
        None
    }
}

// ---
// Lotes
// ---

/// Junta lotes e produtos. O produto ausente vira `None`, nunca erro.
pub fn build_lot_views(
    lots: Vec<StockLot>,
    products: &HashMap<Uuid, Product>,
    today: NaiveDate,
    near_expiry_days: u32,
) -> Vec<LotView> {
    lots.into_iter()
        .map(|lot| LotView {
            product: products.get(&lot.product_id).cloned(),
            expiry_bucket: expiry_bucket(lot.expiry_date, today, near_expiry_days),
            lot,
        })
        .collect()
}

pub fn filter_lots(views: Vec<LotView>, filter: &LotFilter) -> Vec<LotView> {
    let needle = normalize_search(filter.search.as_deref());
    let bucket = filter.expiry.bucket();

    views
        .into_iter()
        .filter(|view| filter.product_id.is_none_or(|id| view.lot.product_id == id))
        .filter(|view| bucket.is_none() || view.expiry_bucket == bucket)
        .filter(|view| match &needle {
            None => true,
            Some(needle) => lot_matches(view, needle),
        })
        .collect()
}

fn lot_matches(view: &LotView, needle: &str) -> bool {
    let mut fields = vec![view.lot.lot_code.as_str()];
    if let Some(product) = &view.product {
        fields.extend([
            product.name.as_str(),
            product.product_type.as_str(),
            product.brand.as_str(),
        ]);
    }
    fields.iter().any(|field| field.to_lowercase().contains(needle))
}

pub fn sort_lots(views: &mut [LotView], sort: LotSort) {
    views.sort_by(|a, b| {
        let primary = match sort.key {
            LotSortKey::ProductName => cmp_missing_last(
                a.product.as_ref().map(|p| p.name.to_lowercase()),
                b.product.as_ref().map(|p| p.name.to_lowercase()),
            ),
            LotSortKey::LotCode => a.lot.lot_code.to_lowercase().cmp(&b.lot.lot_code.to_lowercase()),
            LotSortKey::Quantity => a.lot.quantity.cmp(&b.lot.quantity),
            LotSortKey::ExpiryDate => cmp_missing_last(a.lot.expiry_date, b.lot.expiry_date),
            LotSortKey::RegisteredAt => a.lot.registered_at.cmp(&b.lot.registered_at),
        };
        apply_direction(primary, sort.direction).then_with(|| a.lot.id.cmp(&b.lot.id))
    });
}

/// `listLots`: junção, filtro e ordenação num passo só.
pub fn list_lots(
    lots: Vec<StockLot>,
    products: &HashMap<Uuid, Product>,
    filter: &LotFilter,
    sort: LotSort,
    today: NaiveDate,
    near_expiry_days: u32,
) -> Vec<LotView> {
    let views = build_lot_views(lots, products, today, near_expiry_days);
    let mut views = filter_lots(views, filter);
    sort_lots(&mut views, sort);
    views
}

// ---
// Baixas
// ---

pub fn build_deduction_views(
    deductions: Vec<Deduction>,
    lots: &HashMap<Uuid, StockLot>,
    products: &HashMap<Uuid, Product>,
) -> Vec<DeductionView> {
    deductions
        .into_iter()
        .map(|deduction| DeductionView {
            lot_code: lots.get(&deduction.lot_id).map(|lot| lot.lot_code.clone()),
            product_name: products.get(&deduction.product_id).map(|p| p.name.clone()),
            deduction,
        })
        .collect()
}

pub fn filter_deductions(views: Vec<DeductionView>, filter: &DeductionFilter) -> Vec<DeductionView> {
    let needle = normalize_search(filter.search.as_deref());

    views
        .into_iter()
        .filter(|v| filter.lot_id.is_none_or(|id| v.deduction.lot_id == id))
        .filter(|v| filter.product_id.is_none_or(|id| v.deduction.product_id == id))
        .filter(|v| filter.principal_id.is_none_or(|id| v.deduction.acting_principal_id == id))
        .filter(|v| filter.reason.is_none_or(|reason| v.deduction.reason == reason))
        .filter(|v| filter.from.is_none_or(|from| v.deduction.occurred_at >= from))
        .filter(|v| filter.to.is_none_or(|to| v.deduction.occurred_at <= to))
        .filter(|v| match &needle {
            None => true,
            Some(needle) => deduction_matches(v, needle),
        })
        .collect()
}

fn deduction_matches(view: &DeductionView, needle: &str) -> bool {
    let d = &view.deduction;
    [
        view.product_name.as_deref(),
        view.lot_code.as_deref(),
        Some(d.acting_principal_name.as_str()),
        d.note.as_deref(),
        Some(d.reason.label()),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}

pub fn sort_deductions(views: &mut [DeductionView], sort: DeductionSort) {
    views.sort_by(|a, b| {
        let primary = match sort.key {
            DeductionSortKey::OccurredAt => a.deduction.occurred_at.cmp(&b.deduction.occurred_at),
            DeductionSortKey::Quantity => a.deduction.quantity.cmp(&b.deduction.quantity),
            DeductionSortKey::ProductName => cmp_missing_last(
                a.product_name.as_ref().map(|n| n.to_lowercase()),
                b.product_name.as_ref().map(|n| n.to_lowercase()),
            ),
        };
        apply_direction(primary, sort.direction).then_with(|| a.deduction.id.cmp(&b.deduction.id))
    });
}

/// `listDeductions`: junção, filtro e ordenação.
pub fn list_deductions(
    deductions: Vec<Deduction>,
    lots: &HashMap<Uuid, StockLot>,
    products: &HashMap<Uuid, Product>,
    filter: &DeductionFilter,
    sort: DeductionSort,
) -> Vec<DeductionView> {
    let views = build_deduction_views(deductions, lots, products);
    let mut views = filter_deductions(views, filter);
    sort_deductions(&mut views, sort);
    views
}

// ---
// Auxiliares
// ---

fn normalize_search(search: Option<&str>) -> Option<String> {
    search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

// Ascendente: ausentes no fim. Invertido no descendente, ficam no começo.
fn cmp_missing_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn apply_direction(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn product(name: &str, product_type: &str, brand: &str) -> Product {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Product {
            id: Uuid::new_v4(),
            name: name.into(),
            product_type: product_type.into(),
            brand: brand.into(),
            unit: "un".into(),
            description: None,
            image_url: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn lot(product_id: Uuid, code: &str, quantity: i64, expiry: Option<NaiveDate>, day: u32) -> StockLot {
        let at = Utc.with_ymd_and_hms(2024, 5, day, 8, 0, 0).unwrap();
        let by = Uuid::nil();
        StockLot {
            id: Uuid::new_v4(),
            product_id,
            lot_code: code.into(),
            quantity,
            initial_quantity: quantity,
            expiry_date: expiry,
            location: "Almoxarifado".into(),
            registered_at: at,
            registered_by: by,
            last_edited_at: at,
            last_edited_by: by,
            version: 1,
        }
    }

    fn days_from_today(days: i64) -> Option<NaiveDate> {
        Some(today() + Duration::days(days))
    }

    struct Fixture {
        products: HashMap<Uuid, Product>,
        lots: Vec<StockLot>,
    }

    fn fixture() -> Fixture {
        let luva = product("Luva nitrílica", "EPI", "Supermax");
        let alcool = product("Álcool 70%", "Limpeza", "Tupi");
        let lots = vec![
            lot(luva.id, "LV-01", 10, days_from_today(-1), 1),  // vencido
            lot(luva.id, "LV-02", 4, days_from_today(0), 2),    // vence hoje
            lot(alcool.id, "AL-01", 7, days_from_today(30), 3), // limite da janela
            lot(alcool.id, "AL-02", 1, days_from_today(31), 4), // fora da janela
            lot(alcool.id, "AL-03", 3, None, 5),                // sem validade
            lot(Uuid::new_v4(), "XX-01", 2, None, 6),           // produto removido
        ];
        let products = [luva, alcool].into_iter().map(|p| (p.id, p)).collect();
        Fixture { products, lots }
    }

    fn codes(views: &[LotView]) -> Vec<&str> {
        views.iter().map(|v| v.lot.lot_code.as_str()).collect()
    }

    #[test]
    fn buckets_are_relative_to_today() {
        let t = today();
        assert_eq!(expiry_bucket(days_from_today(-1), t, 30), Some(ExpiryBucket::Expired));
        assert_eq!(expiry_bucket(days_from_today(0), t, 30), Some(ExpiryBucket::NearExpiry));
        assert_eq!(expiry_bucket(days_from_today(30), t, 30), Some(ExpiryBucket::NearExpiry));
        assert_eq!(expiry_bucket(days_from_today(31), t, 30), None);
        assert_eq!(expiry_bucket(None, t, 30), Some(ExpiryBucket::NoExpiry));
    }

    #[test]
    fn expiry_filters_are_mutually_exclusive() {
        let f = fixture();
        let views = build_lot_views(f.lots, &f.products, today(), DEFAULT_NEAR_EXPIRY_DAYS);

        let by = |expiry| {
            let filter = LotFilter { expiry, ..Default::default() };
            let mut out = filter_lots(views.clone(), &filter);
            sort_lots(&mut out, LotSort { key: LotSortKey::LotCode, direction: SortDirection::Asc });
            out
        };

        assert_eq!(codes(&by(ExpiryFilter::Expired)), vec!["LV-01"]);
        assert_eq!(codes(&by(ExpiryFilter::NearExpiry)), vec!["AL-01", "LV-02"]);
        assert_eq!(codes(&by(ExpiryFilter::NoExpiry)), vec!["AL-03", "XX-01"]);
        assert_eq!(by(ExpiryFilter::All).len(), 6);
    }

    #[test]
    fn missing_product_is_a_nullable_join() {
        let f = fixture();
        let views = list_lots(
            f.lots,
            &f.products,
            &LotFilter { search: Some("xx".into()), ..Default::default() },
            LotSort::default(),
            today(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );
        assert_eq!(views.len(), 1);
        assert!(views[0].product.is_none());
    }

    #[test]
    fn search_covers_name_code_type_and_brand() {
        let f = fixture();
        let views = build_lot_views(f.lots, &f.products, today(), DEFAULT_NEAR_EXPIRY_DAYS);
        let search = |text: &str| {
            let filter = LotFilter { search: Some(text.into()), ..Default::default() };
            filter_lots(views.clone(), &filter).len()
        };

        assert_eq!(search("LUVA"), 2);
        assert_eq!(search("al-0"), 3);
        assert_eq!(search("limpeza"), 3);
        assert_eq!(search("supermax"), 2);
        assert_eq!(search("   "), 6);
    }

    #[test]
    fn expiry_sort_puts_missing_last_ascending_and_first_descending() {
        let f = fixture();
        let views = build_lot_views(f.lots, &f.products, today(), DEFAULT_NEAR_EXPIRY_DAYS);

        let mut asc = views.clone();
        sort_lots(&mut asc, LotSort { key: LotSortKey::ExpiryDate, direction: SortDirection::Asc });
        assert_eq!(&codes(&asc)[..4], &["LV-01", "LV-02", "AL-01", "AL-02"]);
        assert!(asc[4..].iter().all(|v| v.lot.expiry_date.is_none()));

        let mut desc = views;
        sort_lots(&mut desc, LotSort { key: LotSortKey::ExpiryDate, direction: SortDirection::Desc });
        assert!(desc[..2].iter().all(|v| v.lot.expiry_date.is_none()));
        assert_eq!(&codes(&desc)[2..], &["AL-02", "AL-01", "LV-02", "LV-01"]);
    }

    #[test]
    fn quantity_and_name_sorts() {
        let f = fixture();
        let views = build_lot_views(f.lots, &f.products, today(), DEFAULT_NEAR_EXPIRY_DAYS);

        let mut by_qty = views.clone();
        sort_lots(&mut by_qty, LotSort { key: LotSortKey::Quantity, direction: SortDirection::Desc });
        let quantities: Vec<i64> = by_qty.iter().map(|v| v.lot.quantity).collect();
        assert_eq!(quantities, vec![10, 7, 4, 3, 2, 1]);

        let mut by_name = views.clone();
        sort_lots(&mut by_name, LotSort::default());
        assert_eq!(by_name[0].product.as_ref().unwrap().name, "Luva nitrílica");
        assert!(by_name.last().unwrap().product.is_none());

        let sorted = |key, direction| {
            let mut out = views.clone();
            sort_lots(&mut out, LotSort { key, direction });
            codes(&out).into_iter().map(String::from).collect::<Vec<_>>()
        };

        assert_eq!(
            sorted(LotSortKey::LotCode, SortDirection::Asc),
            ["AL-01", "AL-02", "AL-03", "LV-01", "LV-02", "XX-01"]
        );
        assert_eq!(
            sorted(LotSortKey::LotCode, SortDirection::Desc),
            ["XX-01", "LV-02", "LV-01", "AL-03", "AL-02", "AL-01"]
        );
        assert_eq!(
            sorted(LotSortKey::RegisteredAt, SortDirection::Asc),
            ["LV-01", "LV-02", "AL-01", "AL-02", "AL-03", "XX-01"]
        );
        assert_eq!(
            sorted(LotSortKey::RegisteredAt, SortDirection::Desc),
            ["XX-01", "AL-03", "AL-02", "AL-01", "LV-02", "LV-01"]
        );
    }

    #[test]
    fn listing_is_deterministic_and_filtering_idempotent() {
        let f = fixture();
        let filter = LotFilter { search: Some("a".into()), expiry: ExpiryFilter::NearExpiry, ..Default::default() };
        let sort = LotSort { key: LotSortKey::Quantity, direction: SortDirection::Asc };

        let first = list_lots(f.lots.clone(), &f.products, &filter, sort, today(), 30);
        let second = list_lots(f.lots, &f.products, &filter, sort, today(), 30);
        assert_eq!(first, second);

        let again = filter_lots(first.clone(), &filter);
        assert_eq!(again, first);
    }

    #[test]
    fn deduction_filters_and_default_sort() {
        let f = fixture();
        let lot = f.lots[0].clone();
        let principal = Uuid::new_v4();
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();

        let deduction = |qty: i64, reason, hours: i64, who: Uuid, note: Option<&str>| Deduction {
            id: Uuid::new_v4(),
            lot_id: lot.id,
            product_id: lot.product_id,
            quantity: qty,
            reason,
            note: note.map(String::from),
            acting_principal_id: who,
            acting_principal_name: "Carlos".into(),
            occurred_at: base + Duration::hours(hours),
        };

        let deductions = vec![
            deduction(1, DeductionReason::Consumption, 0, principal, None),
            deduction(2, DeductionReason::Other, 2, principal, Some("quebra no transporte")),
            deduction(3, DeductionReason::Consumption, 1, Uuid::new_v4(), None),
        ];
        let lots: HashMap<Uuid, StockLot> = f.lots.iter().map(|l| (l.id, l.clone())).collect();

        let all = list_deductions(deductions.clone(), &lots, &f.products, &DeductionFilter::default(), DeductionSort::default());
        let quantities: Vec<i64> = all.iter().map(|v| v.deduction.quantity).collect();
        assert_eq!(quantities, vec![2, 3, 1]);
        assert_eq!(all[0].lot_code.as_deref(), Some("LV-01"));
        assert_eq!(all[0].product_name.as_deref(), Some("Luva nitrílica"));

        let mine = DeductionFilter { principal_id: Some(principal), ..Default::default() };
        assert_eq!(list_deductions(deductions.clone(), &lots, &f.products, &mine, DeductionSort::default()).len(), 2);

        let other = DeductionFilter { reason: Some(DeductionReason::Other), ..Default::default() };
        assert_eq!(list_deductions(deductions.clone(), &lots, &f.products, &other, DeductionSort::default()).len(), 1);

        let window = DeductionFilter {
            from: Some(base + Duration::minutes(30)),
            to: Some(base + Duration::hours(1)),
            ..Default::default()
        };
        let in_window = list_deductions(deductions.clone(), &lots, &f.products, &window, DeductionSort::default());
        assert_eq!(in_window.len(), 1);
        assert_eq!(in_window[0].deduction.quantity, 3);

        let by_note = DeductionFilter { search: Some("QUEBRA".into()), ..Default::default() };
        assert_eq!(list_deductions(deductions.clone(), &lots, &f.products, &by_note, DeductionSort::default()).len(), 1);

        // Baixa de produto removido: nome ausente no começo do descendente
        let moved_to = |source: &StockLot, qty: i64| Deduction {
            id: Uuid::new_v4(),
            lot_id: source.id,
            product_id: source.product_id,
            ..deduction(qty, DeductionReason::Loss, 3, principal, None)
        };
        let mut with_orphan = deductions;
        with_orphan.push(moved_to(&f.lots[5], 5));
        with_orphan.push(moved_to(&f.lots[2], 6));

        let names = |direction| {
            let sort = DeductionSort { key: DeductionSortKey::ProductName, direction };
            list_deductions(with_orphan.clone(), &lots, &f.products, &DeductionFilter::default(), sort)
                .into_iter()
                .map(|v| v.product_name)
                .collect::<Vec<_>>()
        };
        let luva = || Some("Luva nitrílica".to_string());

        assert_eq!(
            names(SortDirection::Desc),
            vec![None, Some("Álcool 70%".to_string()), luva(), luva(), luva()]
        );
        assert_eq!(
            names(SortDirection::Asc),
            vec![luva(), luva(), luva(), Some("Álcool 70%".to_string()), None]
        );
    }
}
