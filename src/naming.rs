//! Constraint and index naming templates.
//!
//! Every constraint the DDL assembler emits gets a deterministic name so
//! schema diffs stay stable across environments: `ix_<table>_<column>`,
//! `uq_<table>_<column>`, `ck_<table>_<constraint>`,
//! `fk_<table>_<column>_<referred_table>`, `pk_<table>`.

pub fn index_name(table: &str, column: &str) -> String {
    format!("ix_{}_{}", table, column)
}

pub fn unique_name(table: &str, first_column: &str) -> String {
    format!("uq_{}_{}", table, first_column)
}

pub fn check_name(table: &str, constraint: &str) -> String {
    format!("ck_{}_{}", table, constraint)
}

pub fn foreign_key_name(table: &str, column: &str, referred_table: &str) -> String {
    format!("fk_{}_{}_{}", table, column, referred_table)
}

pub fn primary_key_name(table: &str) -> String {
    format!("pk_{}", table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates() {
        assert_eq!(index_name("users", "email"), "ix_users_email");
        assert_eq!(unique_name("users", "name"), "uq_users_name");
        assert_eq!(check_name("users", "age_positive"), "ck_users_age_positive");
        assert_eq!(
            foreign_key_name("posts", "author_id", "users"),
            "fk_posts_author_id_users"
        );
        assert_eq!(primary_key_name("users"), "pk_users");
    }
}
