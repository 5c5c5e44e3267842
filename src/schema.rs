use crate::error::BiokbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    /// Ordered, duplicate-free collection merged by set union across writes.
    TextArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn text(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Text,
    }
}

const fn integer(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Integer,
    }
}

const fn real(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Real,
    }
}

const fn text_array(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::TextArray,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub parent_table: &'static str,
    pub parent_column: &'static str,
}

/// Static declaration of one target table: its TSV input layout, key
/// columns, per-invocation attached columns and declared references.
/// Scalar versus array behavior follows each column's [`ColumnKind`].
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub name: &'static str,
    /// Parsed columns in input order, one per TSV field.
    pub input_columns: &'static [Column],
    /// Columns supplied once per invocation and attached to every row.
    pub attached_columns: &'static [Column],
    pub key_columns: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
    /// Mapping-table exception: key slots may be null and uniqueness is
    /// enforced over the full tuple.
    pub allow_null_keys: bool,
}

impl TableSchema {
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.input_columns.iter().chain(self.attached_columns.iter())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns().find(|column| column.name == name)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.key_columns.contains(&name)
    }

    pub fn is_array(&self, name: &str) -> bool {
        self.column(name)
            .map(|column| column.kind == ColumnKind::TextArray)
            .unwrap_or(false)
    }

    /// A table with nothing to merge beyond its key tuple.
    pub fn is_association(&self) -> bool {
        self.columns().all(|column| self.is_key(column.name))
    }
}

pub const TABLE_ID_MAPPER: TableSchema = TableSchema {
    name: "id_mapper",
    input_columns: &[
        text("uniprot_accession"),
        text("refseq_locus_tag"),
        text("locus_tag"),
        text("kegg_accession"),
        text("refseq_protein_id"),
    ],
    attached_columns: &[],
    key_columns: &[
        "uniprot_accession",
        "refseq_locus_tag",
        "locus_tag",
        "kegg_accession",
        "refseq_protein_id",
    ],
    foreign_keys: &[],
    allow_null_keys: true,
};

pub const TABLE_UNIPROT: TableSchema = TableSchema {
    name: "uniprot",
    input_columns: &[
        text("uniprot_accession"),
        text_array("locus_tag"),
        text_array("orf_name"),
        text_array("kegg_accession"),
        text_array("refseq_protein_id"),
        text("embl_protein_id"),
        text("protein_name"),
        text("protein_existence"),
        text("sequence"),
    ],
    attached_columns: &[],
    key_columns: &["uniprot_accession"],
    foreign_keys: &[],
    allow_null_keys: false,
};

pub const TABLE_UNIPROT_KEYWORD: TableSchema = TableSchema {
    name: "uniprot_keyword",
    input_columns: &[text("uniprot_accession"), text("keyword")],
    attached_columns: &[],
    key_columns: &["uniprot_accession", "keyword"],
    foreign_keys: &[ForeignKey {
        column: "uniprot_accession",
        parent_table: "uniprot",
        parent_column: "uniprot_accession",
    }],
    allow_null_keys: false,
};

pub const TABLE_REFSEQ: TableSchema = TableSchema {
    name: "refseq",
    input_columns: &[
        text("refseq_locus_tag"),
        text_array("locus_tag"),
        text_array("refseq_protein_id"),
        text("strand_location"),
        integer("start_position"),
        integer("end_position"),
        text("protein_sequence"),
    ],
    attached_columns: &[],
    key_columns: &["refseq_locus_tag"],
    foreign_keys: &[],
    allow_null_keys: false,
};

pub const TABLE_KEGG: TableSchema = TableSchema {
    name: "kegg",
    input_columns: &[
        text("kegg_accession"),
        text_array("pathway"),
        text_array("orthology"),
    ],
    attached_columns: &[],
    key_columns: &["kegg_accession"],
    foreign_keys: &[],
    allow_null_keys: false,
};

pub const TABLE_KEGG_RELATIONS: TableSchema = TableSchema {
    name: "kegg_relations",
    input_columns: &[
        text("source_accession"),
        text("target_accession"),
        text("pathway_id"),
        text("relation_type"),
        text_array("relation_subtype"),
        text_array("relation_subtype_value"),
    ],
    attached_columns: &[],
    key_columns: &[
        "source_accession",
        "target_accession",
        "pathway_id",
        "relation_type",
    ],
    foreign_keys: &[],
    allow_null_keys: false,
};

pub const TABLE_STRING_INTERACTIONS: TableSchema = TableSchema {
    name: "string_interactions",
    input_columns: &[
        text("protein_a"),
        text("protein_b"),
        real("neighborhood"),
        real("neighborhood_transferred"),
        real("fusion"),
        real("phylogenetic_cooccurrence"),
        real("homology"),
        real("coexpression"),
        real("coexpression_transferred"),
        real("experimental"),
        real("experimental_transferred"),
        real("database"),
        real("database_transferred"),
        real("textmining"),
        real("textmining_transferred"),
        real("combined_score"),
    ],
    attached_columns: &[],
    key_columns: &["protein_a", "protein_b"],
    foreign_keys: &[],
    allow_null_keys: false,
};

pub const TABLE_EXPERIMENTAL_CONDITION: TableSchema = TableSchema {
    name: "experimental_condition",
    input_columns: &[text("condition_name"), text("description")],
    attached_columns: &[],
    key_columns: &["condition_name"],
    foreign_keys: &[],
    allow_null_keys: false,
};

pub const TABLE_TRANSCRIPTOMICS_COUNTS: TableSchema = TableSchema {
    name: "transcriptomics_counts",
    input_columns: &[text("refseq_locus_tag"), integer("read_count")],
    attached_columns: &[text("condition_name"), integer("replicate")],
    key_columns: &["refseq_locus_tag", "condition_name", "replicate"],
    foreign_keys: &[
        ForeignKey {
            column: "refseq_locus_tag",
            parent_table: "refseq",
            parent_column: "refseq_locus_tag",
        },
        ForeignKey {
            column: "condition_name",
            parent_table: "experimental_condition",
            parent_column: "condition_name",
        },
    ],
    allow_null_keys: false,
};

pub const TABLES: &[TableSchema] = &[
    TABLE_ID_MAPPER,
    TABLE_UNIPROT,
    TABLE_UNIPROT_KEYWORD,
    TABLE_REFSEQ,
    TABLE_KEGG,
    TABLE_KEGG_RELATIONS,
    TABLE_STRING_INTERACTIONS,
    TABLE_EXPERIMENTAL_CONDITION,
    TABLE_TRANSCRIPTOMICS_COUNTS,
];

pub fn lookup(name: &str) -> Result<&'static TableSchema, BiokbError> {
    TABLES
        .iter()
        .find(|table| table.name == name)
        .ok_or_else(|| BiokbError::UnknownTable(name.to_string()))
}
