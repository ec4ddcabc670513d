//! Workforce page: headcount per department and contract.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::aggregate::{AgeDistribution, Grouped};
use crate::models::WorkforceRecord;
use crate::present::{sort_descending, NamedValue};
use crate::rate::{percentage_of, round_to};
use crate::table::{is_truthy, normalize, RecordTable};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filters {
    /// Serve the built-in sample sheet instead of the live one.
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractHeadcount {
    pub total_workers: u64,
    pub men_count: u64,
    pub women_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRow {
    pub name: String,
    pub total_workers: u64,
    /// One entry per contract present in the department, in first-seen order.
    pub contracts: Vec<NamedValue<ContractHeadcount>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractShare {
    pub name: String,
    pub value: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkforceReport {
    pub departments: Vec<DepartmentRow>,
    pub contracts: Vec<String>,
    pub contract_shares: Vec<ContractShare>,
    pub age_buckets: Vec<NamedValue>,
    pub total_workers: u64,
    pub total_men: u64,
    pub total_women: u64,
    pub skipped_rows: usize,
}

/// Dashboard tile computed over every row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkforceSummary {
    pub total_departments: usize,
    pub average_age: f64,
    pub total_men: u64,
    pub total_women: u64,
    pub total_workers: u64,
}

pub fn build(table: &RecordTable) -> WorkforceReport {
    let normalized = normalize::<WorkforceRecord>(table);
    let records = &normalized.records;

    // A blank age cell reads as 0 here, so the worker lands in `<20`.
    let zero = Value::from(0);
    let ages = AgeDistribution::from_cells(
        records
            .iter()
            .map(|r| if is_truthy(&r.age) { &r.age } else { &zero }),
    );

    let mut departments: Grouped<Grouped<ContractHeadcount>> = Grouped::new();
    let mut contract_names = BTreeSet::new();
    for record in records.iter().filter(|r| !r.department.is_empty()) {
        contract_names.insert(record.contract.clone());
        let headcount = departments.entry(&record.department).entry(&record.contract);
        headcount.total_workers += 1;
        match record.sex.as_str() {
            "H" => headcount.men_count += 1,
            "" => {}
            _ => headcount.women_count += 1,
        }
    }

    let mut rows: Vec<DepartmentRow> = departments
        .into_iter()
        .map(|(name, contracts)| DepartmentRow {
            name,
            total_workers: contracts.iter().map(|(_, c)| c.total_workers).sum(),
            contracts: contracts
                .into_iter()
                .map(|(name, headcount)| NamedValue::new(name, headcount))
                .collect(),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    let total_workers: u64 = rows.iter().map(|d| d.total_workers).sum();
    let total_women: u64 = rows
        .iter()
        .flat_map(|d| d.contracts.iter())
        .map(|c| c.value.women_count)
        .sum();

    let contracts: Vec<String> = contract_names.into_iter().collect();
    let mut contract_shares: Vec<ContractShare> = contracts
        .iter()
        .map(|contract| {
            let value: u64 = rows
                .iter()
                .flat_map(|d| d.contracts.iter())
                .filter(|c| &c.name == contract)
                .map(|c| c.value.total_workers)
                .sum();
            ContractShare {
                name: contract.clone(),
                value,
                percentage: percentage_of(value, total_workers, 1),
            }
        })
        .collect();
    sort_descending(&mut contract_shares, |share| &share.value);

    WorkforceReport {
        departments: rows,
        contracts,
        contract_shares,
        age_buckets: ages
            .buckets()
            .map(|(bucket, count)| NamedValue::new(bucket.label(), count))
            .collect(),
        total_workers,
        total_men: total_workers - total_women,
        total_women,
        skipped_rows: normalized.skipped,
    }
}

pub fn summary(table: &RecordTable) -> WorkforceSummary {
    let records = normalize::<WorkforceRecord>(table).records;

    let departments: BTreeSet<&str> = records
        .iter()
        .map(|r| r.department.as_str())
        .filter(|d| !d.is_empty())
        .collect();
    let total_men = records.iter().filter(|r| r.sex == "H").count() as u64;
    let ages: Vec<f64> = records.iter().filter_map(WorkforceRecord::numeric_age).collect();
    let average_age = if ages.is_empty() {
        0.0
    } else {
        round_to(ages.iter().sum::<f64>() / ages.len() as f64, 0)
    };
    let total_workers = records.len() as u64;

    WorkforceSummary {
        total_departments: departments.len(),
        average_age,
        total_men,
        total_women: total_workers.saturating_sub(total_men),
        total_workers,
    }
}

/// Sample sheet served when the live one is unreachable.
pub fn fallback_table() -> Value {
    json!([
        ["codigo", "matricula", "nombre", "nif", "sexo", "edad", "telefono", "contrato", "centro", "grupo",
         "encargado", "departamento", "puesto", "fechaAlta", "fechaBaja", "transportista", "prH1", "prH2",
         "prAS", "baja"],
        [1, "M001", "Juan Perez", "NIF1", "H", 30, "", "Fijo", "C1", "G1", "", "Campo", "Puesto A", "", "", "", "", 0, 0, ""],
        [2, "M002", "Maria Lopez", "NIF2", "F", 28, "", "Temporal", "C1", "G1", "", "Almacen", "Puesto B", "", "", "", "", 0, 0, ""],
        [3, "M003", "Ana Gomez", "NIF3", "F", 35, "", "Fijo", "C1", "G1", "", "Estructora", "Puesto C", "", "", "", "", 0, 0, ""]
    ])
}
