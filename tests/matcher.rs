use biokb_loader::matcher::reconcile_extracts;

const UNIPROT_EXTRACT: &str = "\
P69905\tSmlt0001\tNULL\tsml:Smlt0001\tWP_000001.1
Q9HYI3\tSmlt0002\tNULL\tNULL\tNULL
A0A0B4J2F0\tNULL\tNULL\tNULL\tNULL
";

const REFSEQ_EXTRACT: &str = "\
SMLT_RS00005\tSmlt0001\tWP_000001.1
SMLT_RS00010\tSmlt0002\tWP_000002.1
SMLT_RS00015\tNULL\tWP_000003.1
";

const KEGG_EXTRACT: &str = "\
sml:Smlt0001
sml:Smlt0099
";

#[test]
fn extracts_reconcile_into_mapping_rows() {
    let result = reconcile_extracts(UNIPROT_EXTRACT, REFSEQ_EXTRACT, KEGG_EXTRACT);

    // P69905 links through Smlt0001 to the refseq annotation and KEGG.
    let p69905 = result
        .rows
        .iter()
        .find(|row| row.uniprot_accession.as_deref() == Some("P69905"))
        .unwrap();
    assert_eq!(p69905.locus_tag.as_deref(), Some("Smlt0001"));
    assert_eq!(p69905.refseq_locus_tag.as_deref(), Some("SMLT_RS00005"));
    assert_eq!(p69905.kegg_accession.as_deref(), Some("sml:Smlt0001"));
    assert_eq!(p69905.refseq_protein_id.as_deref(), Some("WP_000001"));

    // Q9HYI3 has no KEGG presence; the slot stays null.
    let q9hyi3 = result
        .rows
        .iter()
        .find(|row| row.uniprot_accession.as_deref() == Some("Q9HYI3"))
        .unwrap();
    assert_eq!(q9hyi3.refseq_locus_tag.as_deref(), Some("SMLT_RS00010"));
    assert_eq!(q9hyi3.kegg_accession, None);

    // An accession with no other namespace is still recorded.
    assert!(
        result
            .rows
            .iter()
            .any(|row| row.uniprot_accession.as_deref() == Some("A0A0B4J2F0")
                && row.locus_tag.is_none())
    );

    // The annotation-only and KEGG-only identifiers each get a row.
    assert!(
        result
            .rows
            .iter()
            .any(|row| row.refseq_locus_tag.as_deref() == Some("SMLT_RS00015"))
    );
    assert!(
        result
            .rows
            .iter()
            .any(|row| row.kegg_accession.as_deref() == Some("sml:Smlt0099"))
    );
}

#[test]
fn shared_locus_tag_never_conflates_accessions() {
    // Two UniProt accessions share a locus tag without ever co-occurring;
    // the RefSeq extract ties that locus tag to its annotation entry. Each
    // accession must keep its own row.
    let uniprot = "\
P69905\tSmlt0001\tNULL\tNULL\tNULL
Q9HYI3\tSmlt0001\tNULL\tNULL\tNULL
";
    let refseq = "SMLT_RS00005\tSmlt0001\tNULL\n";

    let result = reconcile_extracts(uniprot, refseq, "");
    assert_eq!(result.rows.len(), 2);
    for row in &result.rows {
        assert_eq!(row.locus_tag.as_deref(), Some("Smlt0001"));
        assert_eq!(row.refseq_locus_tag.as_deref(), Some("SMLT_RS00005"));
    }
    let accessions: Vec<_> = result
        .rows
        .iter()
        .map(|row| row.uniprot_accession.as_deref())
        .collect();
    assert_eq!(accessions, vec![Some("P69905"), Some("Q9HYI3")]);
}

#[test]
fn rerun_emits_identical_row_order() {
    let first = reconcile_extracts(UNIPROT_EXTRACT, REFSEQ_EXTRACT, KEGG_EXTRACT);
    let second = reconcile_extracts(UNIPROT_EXTRACT, REFSEQ_EXTRACT, KEGG_EXTRACT);
    assert_eq!(first.rows, second.rows);
}

#[test]
fn mapping_rows_render_null_placeholders() {
    let result = reconcile_extracts("", "", "sml:Smlt0099\n");
    assert_eq!(result.rows.len(), 1);
    assert_eq!(
        result.rows[0].to_tsv_line(),
        "NULL\tNULL\tSmlt0099\tsml:Smlt0099\tNULL"
    );
}
