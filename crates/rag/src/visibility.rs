//! Member visibility rule
//!
//! Admins and managers see the organization's whole index. Members see a
//! document only when its source type's [`Reach`] says so:
//!
//! | source type     | visible to a member when                                    |
//! |-----------------|-------------------------------------------------------------|
//! | `comment`       | always (comments are organization-wide)                     |
//! | `task`          | the member is the task's assignee or creator                |
//! | `issue`         | the member is the issue's assignee or reporter              |
//! | `task_document` | the member owns the task (the source id is the task id)     |
//! | `document`      | the document is attached to a task the member owns          |
//!
//! The same rule is evaluated in memory through [`OwnershipLookup`] and
//! compiled into a SQL predicate, so a member's top-K is computed among the
//! documents they may see rather than filtered afterwards.

use crate::types::SourceType;
use uuid::Uuid;

/// Business table whose owner columns decide visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnedTable {
    Tasks,
    Issues,
}

impl OwnedTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            OwnedTable::Tasks => "tasks",
            OwnedTable::Issues => "issues",
        }
    }

    /// Columns naming the users who own a row
    pub fn owner_columns(&self) -> [&'static str; 2] {
        match self {
            OwnedTable::Tasks => ["assigned_to", "created_by"],
            OwnedTable::Issues => ["assigned_to", "reported_by"],
        }
    }
}

/// How a member reaches a document of a given source type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// Everyone in the organization
    Organization,
    /// The source id is a row of the table and the member owns it
    OwnedRow(OwnedTable),
    /// The source id is an uploaded document attached to a task the member owns
    AttachedTask,
}

impl Reach {
    pub fn for_member(source_type: SourceType) -> Self {
        match source_type {
            SourceType::Comment => Reach::Organization,
            SourceType::Task | SourceType::TaskDocument => Reach::OwnedRow(OwnedTable::Tasks),
            SourceType::Issue => Reach::OwnedRow(OwnedTable::Issues),
            SourceType::Document => Reach::AttachedTask,
        }
    }
}

/// Users who own a task or issue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub assignee: Option<Uuid>,
    /// Creator of a task, reporter of an issue
    pub owner: Option<Uuid>,
}

impl Ownership {
    pub fn includes(&self, user_id: Uuid) -> bool {
        self.assignee == Some(user_id) || self.owner == Some(user_id)
    }
}

/// Ownership facts needed to evaluate the rule outside the database
pub trait OwnershipLookup {
    fn ownership(&self, org_id: Uuid, table: OwnedTable, id: Uuid) -> Option<Ownership>;

    /// Task an uploaded document is attached to
    fn attached_task(&self, org_id: Uuid, document_id: Uuid) -> Option<Uuid>;
}

/// The member-restricted view of an organization's index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberVisibility {
    pub user_id: Uuid,
}

impl MemberVisibility {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }

    /// Whether the member may see the document `(source_type, source_id)` of `org_id`
    pub fn permits<L: OwnershipLookup + ?Sized>(
        &self,
        lookup: &L,
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
    ) -> bool {
        let owns_row = |table: OwnedTable, id: Uuid| {
            lookup
                .ownership(org_id, table, id)
                .is_some_and(|o| o.includes(self.user_id))
        };

        match Reach::for_member(source_type) {
            Reach::Organization => true,
            Reach::OwnedRow(table) => owns_row(table, source_id),
            Reach::AttachedTask => lookup
                .attached_task(org_id, source_id)
                .is_some_and(|task_id| owns_row(OwnedTable::Tasks, task_id)),
        }
    }

    /// Compile the rule into a SQL boolean expression.
    ///
    /// `doc` is the alias of the indexed-documents table (columns
    /// `source_type`, `source_id`, `org_id`); `user_param` is the bind
    /// placeholder carrying the member's id, e.g. `$4`.
    pub fn sql_predicate(doc: &str, user_param: &str) -> String {
        let owned = |alias: &str, table: OwnedTable| {
            table
                .owner_columns()
                .iter()
                .map(|column| format!("{alias}.{column} = {user_param}"))
                .collect::<Vec<_>>()
                .join(" OR ")
        };

        let clauses: Vec<String> = SourceType::ALL
            .into_iter()
            .map(|source_type| {
                let label = source_type.as_str();
                match Reach::for_member(source_type) {
                    Reach::Organization => format!("{doc}.source_type = '{label}'"),
                    Reach::OwnedRow(table) => format!(
                        "({doc}.source_type = '{label}' AND EXISTS (\
                         SELECT 1 FROM {t} o WHERE o.id = {doc}.source_id \
                         AND o.org_id = {doc}.org_id AND ({owners})))",
                        t = table.table_name(),
                        owners = owned("o", table),
                    ),
                    Reach::AttachedTask => format!(
                        "({doc}.source_type = '{label}' AND EXISTS (\
                         SELECT 1 FROM documents a JOIN tasks o \
                         ON o.id = a.task_id AND o.org_id = a.org_id \
                         WHERE a.id = {doc}.source_id AND a.org_id = {doc}.org_id \
                         AND ({owners})))",
                        owners = owned("o", OwnedTable::Tasks),
                    ),
                }
            })
            .collect();

        format!("({})", clauses.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Facts {
        rows: HashMap<(OwnedTable, Uuid), Ownership>,
        attachments: HashMap<Uuid, Uuid>,
    }

    impl OwnershipLookup for Facts {
        fn ownership(&self, _org_id: Uuid, table: OwnedTable, id: Uuid) -> Option<Ownership> {
            self.rows.get(&(table, id)).copied()
        }

        fn attached_task(&self, _org_id: Uuid, document_id: Uuid) -> Option<Uuid> {
            self.attachments.get(&document_id).copied()
        }
    }

    #[test]
    fn test_member_without_ownership_sees_only_comments() {
        let facts = Facts::default();
        let member = MemberVisibility::new(Uuid::new_v4());
        let org = Uuid::new_v4();

        for source_type in SourceType::ALL {
            let visible = member.permits(&facts, org, source_type, Uuid::new_v4());
            assert_eq!(visible, source_type == SourceType::Comment, "{source_type}");
        }
    }

    #[test]
    fn test_task_ownership() {
        let me = Uuid::new_v4();
        let someone = Uuid::new_v4();
        let (assigned, created, foreign) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut facts = Facts::default();
        facts.rows.insert(
            (OwnedTable::Tasks, assigned),
            Ownership { assignee: Some(me), owner: Some(someone) },
        );
        facts.rows.insert(
            (OwnedTable::Tasks, created),
            Ownership { assignee: None, owner: Some(me) },
        );
        facts.rows.insert(
            (OwnedTable::Tasks, foreign),
            Ownership { assignee: Some(someone), owner: Some(someone) },
        );

        let member = MemberVisibility::new(me);
        let org = Uuid::new_v4();
        assert!(member.permits(&facts, org, SourceType::Task, assigned));
        assert!(member.permits(&facts, org, SourceType::Task, created));
        assert!(!member.permits(&facts, org, SourceType::Task, foreign));
        // task documents are keyed by their task
        assert!(member.permits(&facts, org, SourceType::TaskDocument, created));
        assert!(!member.permits(&facts, org, SourceType::TaskDocument, foreign));
    }

    #[test]
    fn test_issue_reporter_and_document_attachment() {
        let me = Uuid::new_v4();
        let (issue, task, doc, loose_doc) =
            (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut facts = Facts::default();
        facts.rows.insert(
            (OwnedTable::Issues, issue),
            Ownership { assignee: None, owner: Some(me) },
        );
        facts.rows.insert(
            (OwnedTable::Tasks, task),
            Ownership { assignee: Some(me), owner: None },
        );
        facts.attachments.insert(doc, task);

        let member = MemberVisibility::new(me);
        let org = Uuid::new_v4();
        assert!(member.permits(&facts, org, SourceType::Issue, issue));
        assert!(member.permits(&facts, org, SourceType::Document, doc));
        assert!(!member.permits(&facts, org, SourceType::Document, loose_doc));
        // an issue id is not a task id
        assert!(!member.permits(&facts, org, SourceType::Task, issue));
    }

    #[test]
    fn test_sql_predicate_shape() {
        let sql = MemberVisibility::sql_predicate("d", "$4");

        assert!(sql.starts_with('(') && sql.ends_with(')'));
        assert!(sql.contains("d.source_type = 'comment'"));
        assert!(sql.contains("FROM tasks o WHERE o.id = d.source_id"));
        assert!(sql.contains("o.assigned_to = $4 OR o.created_by = $4"));
        assert!(sql.contains("FROM issues o"));
        assert!(sql.contains("o.assigned_to = $4 OR o.reported_by = $4"));
        assert!(sql.contains("d.source_type = 'task_document' AND EXISTS"));
        assert!(sql.contains("FROM documents a JOIN tasks o"));
        assert_eq!(sql.matches("EXISTS").count(), 4);
    }
}
