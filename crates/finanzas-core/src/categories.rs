// Category lists: built-in defaults plus the user's custom additions.

use thiserror::Error;

use crate::model::{CustomCategory, Transaction, TransactionKind};

pub const DEFAULT_EXPENSE_CATEGORIES: [&str; 8] = [
    "Alimentación",
    "Transporte",
    "Entretenimiento",
    "Salud",
    "Educación",
    "Hogar",
    "Ropa",
    "Otros",
];

pub const DEFAULT_INCOME_CATEGORIES: [&str; 5] =
    ["Salario", "Freelance", "Inversiones", "Bonos", "Otros"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error("Por favor ingresa un nombre para la categoría")]
    EmptyName,

    #[error("Esta categoría ya existe")]
    AlreadyExists,

    #[error("No se pueden eliminar las categorías predeterminadas")]
    DefaultCategory,

    #[error("No se puede eliminar esta categoría porque tiene transacciones asociadas")]
    InUse,

    #[error("La categoría no existe")]
    NotFound,
}

pub fn defaults(kind: TransactionKind) -> &'static [&'static str] {
    match kind {
        TransactionKind::Expense => &DEFAULT_EXPENSE_CATEGORIES,
        TransactionKind::Income => &DEFAULT_INCOME_CATEGORIES,
    }
}

pub fn is_default(kind: TransactionKind, name: &str) -> bool {
    defaults(kind).contains(&name)
}

/// Ordered category names per kind: defaults first, then custom ones in the
/// order they were created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    pub expense: Vec<String>,
    pub income: Vec<String>,
}

impl Default for CategorySet {
    fn default() -> Self {
        CategorySet {
            expense: DEFAULT_EXPENSE_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            income: DEFAULT_INCOME_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CategorySet {
    /// Defaults extended with `custom`, skipping names already listed.
    pub fn with_custom(custom: &[CustomCategory]) -> Self {
        let mut set = CategorySet::default();
        for c in custom {
            let name = c.name.trim();
            if name.is_empty() {
                continue;
            }
            let list = set.list_mut(c.kind());
            if !list.iter().any(|n| n == name) {
                list.push(name.to_string());
            }
        }
        set
    }

    pub fn list(&self, kind: TransactionKind) -> &[String] {
        match kind {
            TransactionKind::Expense => &self.expense,
            TransactionKind::Income => &self.income,
        }
    }

    fn list_mut(&mut self, kind: TransactionKind) -> &mut Vec<String> {
        match kind {
            TransactionKind::Expense => &mut self.expense,
            TransactionKind::Income => &mut self.income,
        }
    }

    pub fn contains(&self, kind: TransactionKind, name: &str) -> bool {
        self.list(kind).iter().any(|n| n == name)
    }

    /// Custom (non-default) names of a kind.
    pub fn custom(&self, kind: TransactionKind) -> impl Iterator<Item = &String> {
        self.list(kind).iter().filter(move |n| !is_default(kind, n))
    }

    /// Check a name before insertion. Returns the trimmed name.
    pub fn validate_new(&self, kind: TransactionKind, name: &str) -> Result<String, CategoryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CategoryError::EmptyName);
        }
        if self.contains(kind, name) {
            return Err(CategoryError::AlreadyExists);
        }
        Ok(name.to_string())
    }

    /// Check that a category may be deleted given the user's transactions.
    pub fn validate_delete(
        &self,
        kind: TransactionKind,
        name: &str,
        transactions: &[Transaction],
    ) -> Result<(), CategoryError> {
        if is_default(kind, name) {
            return Err(CategoryError::DefaultCategory);
        }
        if !self.contains(kind, name) {
            return Err(CategoryError::NotFound);
        }
        if transactions.iter().any(|t| t.category == name) {
            return Err(CategoryError::InUse);
        }
        Ok(())
    }

    pub fn insert(&mut self, kind: TransactionKind, name: &str) {
        if !self.contains(kind, name) {
            self.list_mut(kind).push(name.to_string());
        }
    }

    pub fn remove(&mut self, kind: TransactionKind, name: &str) {
        self.list_mut(kind).retain(|n| n != name);
    }
}
