//! Authoritative assertion description table, owned by the reporting sink.

/// Every assertion identity the engine can begin, with the normative rule it
/// verifies. The tabular sink pre-builds one row per entry, which makes row
/// lookup by identity deterministic for the whole run.
pub const ASSERTION_DESCRIPTIONS: &[(&str, &str)] = &[
    // Protocol / transport
    ("6.1.1", "GET /redfish returns the protocol version body {\"v1\": \"/redfish/v1/\"}"),
    ("6.1.2", "Service root is retrievable without authentication"),
    ("6.1.3", "OData service document lists top-level service entries in a value array"),
    ("6.1.4", "Metadata document is served as an XML CSDL document"),
    ("6.2.1", "Every non-member resource answers GET with 200 and a JSON body"),
    ("6.2.2", "TRACE is not supported on the service root"),
    ("6.2.3", "HEAD on the service root mirrors GET headers with an empty body"),
    ("6.3.1", "An unsupported OData-Version request header is rejected"),
    ("6.3.2", "Accept negotiation for a non-JSON media type yields 406 or a valid 200"),
    ("6.4.1", "Allow header on GET responses names the methods the resource supports"),
    ("6.5.1", "Manager account resources carry an ETag on GET"),
    ("6.5.2", "Conditional GET with a current ETag yields 304 Not Modified"),
    // Data model / schema
    ("7.1.1", "Every non-member resource carries @odata.id and @odata.type"),
    ("7.2.1", "Collection payloads carry Members and Members@odata.count"),
    ("7.2.2", "Members@odata.count equals the number of members reachable through paging"),
    ("7.3.1", "Payload properties are declared by the resolved schema type"),
    ("7.3.2", "Properties annotated read-only are not writable via PATCH"),
    ("7.4.1", "A Members@odata.nextLink page is retrievable and non-empty"),
    // Service / resource semantics
    ("8.1.1", "POST creating a resource returns a Location header"),
    ("8.1.2", "GET by Location after POST returns the created representation"),
    ("8.2.1", "Actions advertised by a resource expose a target URI"),
    ("8.3.1", "DELETE on a resource collection is rejected"),
    ("8.4.1", "An unknown resource under the service root yields 404"),
    // Security / authorization
    ("9.1.1", "Protected resources require authentication"),
    ("9.1.2", "Invalid credentials are rejected with 401"),
    ("9.2.1", "POST to the session collection creates a session with token and Location"),
    ("9.2.2", "A session token authorizes requests"),
    ("9.2.3", "DELETE on a session invalidates its token"),
    ("9.3.1", "POST to the account collection creates a manager account"),
    ("9.3.2", "A created account appears in the account collection"),
    ("9.3.3", "A manager account is modifiable via PATCH"),
    ("9.3.4", "DELETE removes a manager account"),
];

/// Rule text for an identity, if the table knows it.
pub fn description_of(id: &str) -> Option<&'static str> {
    ASSERTION_DESCRIPTIONS
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, description)| *description)
}
