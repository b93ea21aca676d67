use crate::schema::{BranchInfo, CompanyInfo};
use log::warn;
use std::collections::HashMap;

/// Registry key for a company code. Numeric codes compare by value so that
/// `"0002"` and `"2"` name the same company.
pub fn normalize_company_code(code: &str) -> String {
    let trimmed = code.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        let stripped = trimmed.trim_start_matches('0');
        if stripped.is_empty() {
            "0".to_string()
        } else {
            stripped.to_string()
        }
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompanyRegistry {
    companies: HashMap<String, CompanyInfo>,
}

impl CompanyRegistry {
    pub fn new(rows: &[CompanyInfo]) -> Self {
        let mut companies = HashMap::new();
        for row in rows {
            let key = normalize_company_code(&row.company_code);
            if companies.insert(key, row.clone()).is_some() {
                warn!(
                    "Company {} is registered more than once; keeping the last entry",
                    row.company_code
                );
            }
        }
        Self { companies }
    }

    pub fn get(&self, company_code: &str) -> Option<&CompanyInfo> {
        self.companies.get(&normalize_company_code(company_code))
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BranchRegistry {
    branches: HashMap<String, BranchInfo>,
}

impl BranchRegistry {
    pub fn new(rows: &[BranchInfo]) -> Self {
        let mut branches = HashMap::new();
        for row in rows {
            if branches
                .insert(row.sub_branch_code.trim().to_string(), row.clone())
                .is_some()
            {
                warn!(
                    "Sub-branch {} is assigned to more than one branch; keeping the last entry",
                    row.sub_branch_code
                );
            }
        }
        Self { branches }
    }

    pub fn branch_of(&self, sub_branch_code: &str) -> Option<&BranchInfo> {
        self.branches.get(sub_branch_code.trim())
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}
