//! Request controls the engine sends and the response controls it reads
//! back. Paged results use `ldap3`'s own control; sort and virtual list
//! view are BER-encoded here.

use bytes::BytesMut;
use dirstore_core::ldap::{SearchControl, SortKey, VlvResponse};
use dirstore_pool::{PAGED_RESULTS_OID, SERVER_SIDE_SORT_OID, SUBTREE_DELETE_OID, VIRTUAL_LIST_VIEW_OID};
use ldap3::asn1::{parse_tag, parse_uint, write, ASNTag, Boolean, Integer, OctetString, Sequence, StructureTag, Tag, TagClass, PL};
use ldap3::controls::{Control, PagedResults, RawControl};

/// Virtual list view response control.
pub const VIRTUAL_LIST_VIEW_RESPONSE_OID: &str = "2.16.840.1.113730.3.4.10";

fn encode(tag: Tag) -> Vec<u8> {
    let mut buf = BytesMut::new();
    // writing into memory cannot fail
    let _ = write::encode_into(&mut buf, tag.into_structure());
    buf.to_vec()
}

fn integer(value: usize) -> Tag {
    Tag::Integer(Integer {
        inner: i64::try_from(value).unwrap_or(i64::MAX),
        ..Default::default()
    })
}

fn paged_results(size: usize, cookie: &[u8]) -> RawControl {
    PagedResults {
        size: i32::try_from(size).unwrap_or(i32::MAX),
        cookie: cookie.to_vec(),
    }
    .into()
}

fn server_side_sort(keys: &[SortKey]) -> RawControl {
    let keys = keys
        .iter()
        .map(|key| {
            let mut inner = vec![Tag::OctetString(OctetString {
                inner: key.attribute.as_bytes().to_vec(),
                ..Default::default()
            })];
            if key.reverse {
                inner.push(Tag::Boolean(Boolean {
                    id: 1,
                    class: TagClass::Context,
                    inner: true,
                }));
            }
            Tag::Sequence(Sequence {
                inner,
                ..Default::default()
            })
        })
        .collect();
    RawControl {
        ctype: SERVER_SIDE_SORT_OID.to_string(),
        crit: true,
        val: Some(encode(Tag::Sequence(Sequence {
            inner: keys,
            ..Default::default()
        }))),
    }
}

fn virtual_list_view(target_offset: usize, before_count: usize, after_count: usize, content_count: usize) -> RawControl {
    let by_offset = Tag::Sequence(Sequence {
        id: 0,
        class: TagClass::Context,
        inner: vec![integer(target_offset), integer(content_count)],
    });
    let value = Tag::Sequence(Sequence {
        inner: vec![integer(before_count), integer(after_count), by_offset],
        ..Default::default()
    });
    RawControl {
        ctype: VIRTUAL_LIST_VIEW_OID.to_string(),
        crit: true,
        val: Some(encode(value)),
    }
}

/// Wire form of one request control.
pub fn to_raw(control: &SearchControl) -> RawControl {
    match control {
        SearchControl::PagedResults { size, cookie } => paged_results(*size, cookie),
        SearchControl::ServerSideSort { keys } => server_side_sort(keys),
        SearchControl::VirtualListView {
            target_offset,
            before_count,
            after_count,
            content_count,
        } => virtual_list_view(*target_offset, *before_count, *after_count, *content_count),
    }
}

/// The tree delete control. It carries no value.
pub fn subtree_delete() -> RawControl {
    RawControl {
        ctype: SUBTREE_DELETE_OID.to_string(),
        crit: true,
        val: None,
    }
}

fn components(value: &[u8]) -> Option<Vec<StructureTag>> {
    let (_, tag) = parse_tag(value).ok()?;
    match tag.payload {
        PL::C(inner) => Some(inner),
        PL::P(_) => None,
    }
}

fn count(tag: &StructureTag) -> Option<usize> {
    let PL::P(bytes) = &tag.payload else {
        return None;
    };
    let (_, value) = parse_uint(bytes).ok()?;
    usize::try_from(value).ok()
}

fn find<'c>(controls: &'c [Control], oid: &str) -> Option<&'c RawControl> {
    controls
        .iter()
        .map(|Control(_, raw)| raw)
        .find(|raw| raw.ctype == oid && raw.val.is_some())
}

/// Cookie of a paged results response. `None` when the control is absent.
pub fn paged_results_cookie(controls: &[Control]) -> Option<Vec<u8>> {
    let paged: PagedResults = find(controls, PAGED_RESULTS_OID)?.parse();
    Some(paged.cookie)
}

/// Window metadata of a virtual list view response.
pub fn virtual_list_view_response(controls: &[Control]) -> Option<VlvResponse> {
    let parts = components(find(controls, VIRTUAL_LIST_VIEW_RESPONSE_OID)?.val.as_deref()?)?;
    Some(VlvResponse {
        target_position: count(parts.first()?)?,
        content_count: count(parts.get(1)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(oid: &str, value: Vec<u8>) -> Control {
        Control(
            None,
            RawControl {
                ctype: oid.to_string(),
                crit: false,
                val: Some(value),
            },
        )
    }

    fn primitive(tag: &StructureTag) -> Option<&[u8]> {
        match &tag.payload {
            PL::P(bytes) => Some(bytes),
            PL::C(_) => None,
        }
    }

    fn counts(tags: &[StructureTag]) -> Vec<usize> {
        tags.iter().filter_map(count).collect()
    }

    fn nested(tag: &StructureTag) -> &[StructureTag] {
        match &tag.payload {
            PL::C(inner) => inner,
            PL::P(_) => &[],
        }
    }

    #[test]
    fn paged_results_request() {
        let raw = to_raw(&SearchControl::PagedResults {
            size: 100,
            cookie: b"ab".to_vec(),
        });
        assert_eq!(raw.ctype, PAGED_RESULTS_OID);
        let parsed: PagedResults = raw.parse();
        assert_eq!(parsed.size, 100);
        assert_eq!(parsed.cookie, b"ab");
    }

    #[test]
    fn sort_keys_mark_reverse_order() {
        let raw = to_raw(&SearchControl::ServerSideSort {
            keys: vec![
                SortKey {
                    attribute: "cn".to_string(),
                    reverse: false,
                },
                SortKey {
                    attribute: "sn".to_string(),
                    reverse: true,
                },
            ],
        });
        assert!(raw.crit);
        let keys = components(&raw.val.unwrap()).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(nested(&keys[0]).len(), 1);
        assert_eq!(primitive(&nested(&keys[0])[0]), Some(b"cn".as_slice()));

        let reverse = nested(&keys[1]);
        assert_eq!(primitive(&reverse[0]), Some(b"sn".as_slice()));
        assert!(matches!(reverse[1].class, TagClass::Context));
        assert_eq!(reverse[1].id, 1);
        assert!(primitive(&reverse[1]).is_some_and(|b| b.iter().any(|x| *x != 0)));
    }

    #[test]
    fn virtual_list_view_by_offset() {
        let raw = to_raw(&SearchControl::VirtualListView {
            target_offset: 11,
            before_count: 0,
            after_count: 4,
            content_count: 0,
        });
        assert_eq!(raw.ctype, VIRTUAL_LIST_VIEW_OID);
        assert!(raw.crit);
        let parts = components(&raw.val.unwrap()).unwrap();
        assert_eq!(counts(&parts[..2]), [0, 4]);
        assert!(matches!(parts[2].class, TagClass::Context));
        assert_eq!(parts[2].id, 0);
        assert_eq!(counts(nested(&parts[2])), [11, 0]);
    }

    #[test]
    fn subtree_delete_has_no_value() {
        let raw = subtree_delete();
        assert_eq!(raw.ctype, SUBTREE_DELETE_OID);
        assert!(raw.val.is_none());
    }

    #[test]
    fn reads_paged_results_cookie() {
        let value = to_raw(&SearchControl::PagedResults {
            size: 0,
            cookie: b"next".to_vec(),
        })
        .val
        .unwrap();
        let controls = [response(PAGED_RESULTS_OID, value)];
        assert_eq!(paged_results_cookie(&controls), Some(b"next".to_vec()));
        assert_eq!(paged_results_cookie(&[]), None);
    }

    #[test]
    fn reads_virtual_list_view_response() {
        let value = encode(Tag::Sequence(Sequence {
            inner: vec![integer(11), integer(300), integer(0)],
            ..Default::default()
        }));
        let controls = [response(VIRTUAL_LIST_VIEW_RESPONSE_OID, value)];
        assert_eq!(
            virtual_list_view_response(&controls),
            Some(VlvResponse {
                target_position: 11,
                content_count: 300,
            })
        );
        assert_eq!(virtual_list_view_response(&[]), None);
    }
}
