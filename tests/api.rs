mod common;

use std::io::Read;

use serde_json::Value;

use clawdhub::types::Role;
use common::{TestServer, expected_fingerprint, publish_multipart};

const SKILL_MD: &str = "---\nname: demo\ndescription: A demo skill\n---\nBody";

fn payload(slug: &str, version: &str) -> Value {
    serde_json::json!({
        "slug": slug,
        "displayName": slug,
        "version": version,
        "changelog": "",
    })
}

#[tokio::test]
async fn test_publish_and_resolve() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    let files = [("SKILL.md", SKILL_MD)];
    let resp = publish_multipart(&client, &server, &token, payload("demo", "1.0.0"), &files).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["skillId"].as_str().is_some());
    assert!(body["data"]["versionId"].as_str().is_some());

    // The skill is readable and its latest version resolves.
    let resp = client.get(server.url("/skills/demo")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["skill"]["slug"], "demo");
    assert_eq!(body["data"]["latestVersion"]["version"], "1.0.0");
    assert_eq!(body["data"]["skill"]["summary"], "A demo skill");

    // Tag integrity: tags["latest"] equals latestVersionId.
    assert_eq!(
        body["data"]["skill"]["tags"]["latest"],
        body["data"]["skill"]["latestVersionId"]
    );

    // Fingerprint resolution finds the published version.
    let fingerprint = expected_fingerprint(&files);
    let resp = client
        .get(server.url(&format!("/skill/resolve?slug=demo&hash={fingerprint}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["match"]["version"], "1.0.0");
    assert_eq!(body["data"]["latestVersion"]["version"], "1.0.0");

    // An unknown fingerprint yields no match but still reports latest.
    let resp = client
        .get(server.url(&format!(
            "/skill/resolve?slug=demo&hash={}",
            "0".repeat(64)
        )))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["match"].is_null());
    assert_eq!(body["data"]["latestVersion"]["version"], "1.0.0");
}

#[tokio::test]
async fn test_version_conflict() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    let files = [("SKILL.md", SKILL_MD)];
    let resp = publish_multipart(&client, &server, &token, payload("demo", "1.0.0"), &files).await;
    assert_eq!(resp.status(), 200);

    let changed = [("SKILL.md", "---\nname: demo\n---\nChanged")];
    let resp =
        publish_multipart(&client, &server, &token, payload("demo", "1.0.0"), &changed).await;
    assert_eq!(resp.status(), 409);

    // No state change: latest still resolves the original content.
    let fingerprint = expected_fingerprint(&files);
    let resp = client
        .get(server.url(&format!("/skill/resolve?slug=demo&hash={fingerprint}")))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["match"]["version"], "1.0.0");
}

#[tokio::test]
async fn test_publish_forbidden_for_non_owner() {
    let server = TestServer::start().await;
    let (_u1, token1) = server.create_user("u1", Role::User);
    let (_u2, token2) = server.create_user("u2", Role::User);
    let client = reqwest::Client::new();

    let files = [("SKILL.md", SKILL_MD)];
    let resp = publish_multipart(&client, &server, &token1, payload("demo", "1.0.0"), &files).await;
    assert_eq!(resp.status(), 200);

    let resp = publish_multipart(&client, &server, &token2, payload("demo", "1.0.1"), &files).await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_duplicate_detection() {
    let server = TestServer::start().await;
    let (_u1, token1) = server.create_user("u1", Role::User);
    let (_u2, token2) = server.create_user("u2", Role::User);
    let client = reqwest::Client::new();

    let files = [("SKILL.md", SKILL_MD)];
    let resp = publish_multipart(&client, &server, &token1, payload("demo", "1.0.0"), &files).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let demo_id = body["data"]["skillId"].as_str().unwrap().to_string();

    // Identical content under a new slug is recorded as a duplicate.
    let resp =
        publish_multipart(&client, &server, &token2, payload("demo-copy", "1.0.0"), &files).await;
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(server.url("/skills/demo-copy"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["skill"]["forkOf"]["skillId"], demo_id.as_str());
    assert_eq!(body["data"]["skill"]["forkOf"]["kind"], "duplicate");
    assert_eq!(body["data"]["skill"]["canonicalSkillId"], demo_id.as_str());
}

#[tokio::test]
async fn test_second_version_moves_latest() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    let v1_files = [("SKILL.md", SKILL_MD)];
    publish_multipart(&client, &server, &token, payload("demo", "1.0.0"), &v1_files).await;

    let v2_files = [("SKILL.md", SKILL_MD), ("notes.md", "changed")];
    let resp =
        publish_multipart(&client, &server, &token, payload("demo", "1.0.1"), &v2_files).await;
    assert_eq!(resp.status(), 200);

    let resp = client.get(server.url("/skills/demo")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["latestVersion"]["version"], "1.0.1");
    assert_eq!(body["data"]["skill"]["stats"]["versions"], 2);
    assert_eq!(
        body["data"]["skill"]["tags"]["latest"],
        body["data"]["skill"]["latestVersionId"]
    );

    // Both fingerprints still resolve to their versions.
    let fp1 = expected_fingerprint(&v1_files);
    let resp = client
        .get(server.url(&format!("/skill/resolve?slug=demo&hash={fp1}")))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["match"]["version"], "1.0.0");
    assert_eq!(body["data"]["latestVersion"]["version"], "1.0.1");
}

#[tokio::test]
async fn test_download_round_trip() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    let files = [("SKILL.md", SKILL_MD), ("docs/usage.md", "Usage notes")];
    let resp = publish_multipart(&client, &server, &token, payload("demo", "1.0.0"), &files).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let published_fp = body["data"]["fingerprint"].as_str().unwrap().to_string();

    let resp = client
        .get(server.url("/download?slug=demo&version=1.0.0"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/zip"
    );
    let bytes = resp.bytes().await.unwrap();

    // Re-fingerprint the archive contents: must equal the published value.
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    let mut entries: Vec<(String, String)> = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.push((
            entry.name().to_string(),
            clawdhub::registry::sha256_hex(&content),
        ));
    }
    let roundtrip_fp = clawdhub::registry::bundle_fingerprint(
        entries.iter().map(|(p, h)| (p.as_str(), h.as_str())),
    );
    assert_eq!(roundtrip_fp, published_fp);
    assert_eq!(roundtrip_fp, expected_fingerprint(&files));

    // Download counted.
    let resp = client.get(server.url("/skills/demo")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["skill"]["stats"]["downloads"], 1);
}

#[tokio::test]
async fn test_raw_file_read() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    let files = [("SKILL.md", SKILL_MD)];
    publish_multipart(&client, &server, &token, payload("demo", "1.0.0"), &files).await;

    let resp = client
        .get(server.url("/skills/demo/file?path=SKILL.md"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let etag = resp.headers().get("etag").unwrap().to_str().unwrap().to_string();
    assert_eq!(
        etag,
        format!("\"{}\"", clawdhub::registry::sha256_hex(SKILL_MD.as_bytes()))
    );
    assert_eq!(resp.text().await.unwrap(), SKILL_MD);

    let resp = client
        .get(server.url("/skills/demo/file?path=missing.md"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_soft_delete_and_undelete() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    let files = [("SKILL.md", SKILL_MD)];
    publish_multipart(&client, &server, &token, payload("demo", "1.0.0"), &files).await;

    let resp = client
        .delete(server.url("/skills/demo"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Hidden from public reads, resolver, and download.
    let resp = client.get(server.url("/skills/demo")).send().await.unwrap();
    assert_eq!(resp.status(), 410);

    let fingerprint = expected_fingerprint(&files);
    let resp = client
        .get(server.url(&format!("/skill/resolve?slug=demo&hash={fingerprint}")))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["match"].is_null());
    assert!(body["data"]["latestVersion"].is_null());

    // Restore: reachable again via both reads and download.
    let resp = client
        .post(server.url("/skills/demo/undelete"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(server.url("/skills/demo")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(server.url("/download?slug=demo&version=1.0.0"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Embeddings returned to searchable visibility: search finds it again.
    let resp = client
        .get(server.url("/search?q=demo&limit=5"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let slugs: Vec<&str> = body["data"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["slug"].as_str().unwrap())
        .collect();
    assert!(slugs.contains(&"demo"));
}

#[tokio::test]
async fn test_search_exact_token_gating() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    publish_multipart(
        &client,
        &server,
        &token,
        payload("gogkit", "1.0.0"),
        &[(
            "SKILL.md",
            "---\nname: gogkit\ndescription: Google Workspace CLI\n---\nDrive, Sheets, Gmail automation",
        )],
    )
    .await;
    publish_multipart(
        &client,
        &server,
        &token,
        payload("gif-encoder", "1.0.0"),
        &[(
            "SKILL.md",
            "---\nname: gif-encoder\ndescription: Animated GIF encoder\n---\nEncode animations as GIFs",
        )],
    )
    .await;

    let resp = client
        .get(server.url("/search?q=gif&limit=5"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let slugs: Vec<&str> = body["data"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["slug"].as_str().unwrap())
        .collect();

    assert!(slugs.contains(&"gif-encoder"));
    assert!(!slugs.contains(&"gogkit"));
}

#[tokio::test]
async fn test_star_round_trip() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    publish_multipart(
        &client,
        &server,
        &token,
        payload("demo", "1.0.0"),
        &[("SKILL.md", SKILL_MD)],
    )
    .await;

    let stars_of = |body: &Value| body["data"]["skill"]["stats"]["stars"].as_i64().unwrap();

    let resp = client.get(server.url("/skills/demo")).send().await.unwrap();
    let before: Value = resp.json().await.unwrap();
    assert_eq!(stars_of(&before), 0);

    let resp = client
        .post(server.url("/stars/demo"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(server.url("/skills/demo")).send().await.unwrap();
    let starred: Value = resp.json().await.unwrap();
    assert_eq!(stars_of(&starred), 1);

    let resp = client
        .delete(server.url("/stars/demo"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(server.url("/skills/demo")).send().await.unwrap();
    let after: Value = resp.json().await.unwrap();
    assert_eq!(stars_of(&after), 0);
}

#[tokio::test]
async fn test_rate_limit_write_budget() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // 30 writes from one IP with no bearer pass the limiter (they fail by
    // content with 401); the 31st is rejected with 429.
    for n in 1..=30u32 {
        let resp = client
            .post(server.url("/stars/nothing"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401, "request {n} should fail by content");
        let remaining: u32 = resp
            .headers()
            .get("x-ratelimit-remaining")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(remaining, 30 - n);
    }

    let resp = client
        .post(server.url("/stars/nothing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    assert_eq!(
        resp.headers()
            .get("x-ratelimit-remaining")
            .unwrap()
            .to_str()
            .unwrap(),
        "0"
    );
    let retry_after: u64 = resp
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    // Reads are a separate class and still pass.
    let resp = client.get(server.url("/skills")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_whoami_requires_bearer() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    let resp = client.get(server.url("/whoami")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(server.url("/whoami"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["user"]["handle"], "u1");
}

#[tokio::test]
async fn test_validation_failures() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    // Bad slug.
    let resp = publish_multipart(
        &client,
        &server,
        &token,
        payload("Bad_Slug", "1.0.0"),
        &[("SKILL.md", SKILL_MD)],
    )
    .await;
    assert_eq!(resp.status(), 400);

    // Bad semver.
    let resp = publish_multipart(
        &client,
        &server,
        &token,
        payload("demo", "1.0"),
        &[("SKILL.md", SKILL_MD)],
    )
    .await;
    assert_eq!(resp.status(), 400);

    // Missing SKILL.md.
    let resp = publish_multipart(
        &client,
        &server,
        &token,
        payload("demo", "1.0.0"),
        &[("README.md", "no skill file")],
    )
    .await;
    assert_eq!(resp.status(), 400);

    // Disallowed file type.
    let resp = publish_multipart(
        &client,
        &server,
        &token,
        payload("demo", "1.0.0"),
        &[("SKILL.md", SKILL_MD), ("logo.png", "pretend-binary")],
    )
    .await;
    assert_eq!(resp.status(), 400);

    // Path traversal.
    let resp = publish_multipart(
        &client,
        &server,
        &token,
        payload("demo", "1.0.0"),
        &[("SKILL.md", SKILL_MD), ("../escape.md", "nope")],
    )
    .await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_moderation_badges_and_hard_delete() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let (_m1, mod_token) = server.create_user("mod", Role::Moderator);
    let (_a1, admin_token) = server.create_user("root", Role::Admin);
    let client = reqwest::Client::new();

    publish_multipart(
        &client,
        &server,
        &token,
        payload("demo", "1.0.0"),
        &[("SKILL.md", SKILL_MD)],
    )
    .await;

    // A plain user cannot set badges.
    let resp = client
        .post(server.url("/mod/skills/demo/badges"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "kind": "highlighted" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // A moderator can highlight, but not grant official.
    let resp = client
        .post(server.url("/mod/skills/demo/badges"))
        .bearer_auth(&mod_token)
        .json(&serde_json::json!({ "kind": "highlighted" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(server.url("/mod/skills/demo/badges"))
        .bearer_auth(&mod_token)
        .json(&serde_json::json!({ "kind": "official" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client.get(server.url("/skills/demo")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    let badges: Vec<&str> = body["data"]["badges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b.as_str().unwrap())
        .collect();
    assert!(badges.contains(&"highlighted"));

    // highlightedOnly search gate.
    let resp = client
        .get(server.url("/search?q=demo&limit=5&highlightedOnly=true"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 1);

    // Hard delete is admin-only and erases the skill.
    let resp = client
        .delete(server.url("/admin/skills/demo"))
        .bearer_auth(&mod_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .delete(server.url("/admin/skills/demo"))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(server.url("/skills/demo")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_list_skills_pagination() {
    let server = TestServer::start().await;
    let (_u1, token) = server.create_user("u1", Role::User);
    let client = reqwest::Client::new();

    for i in 0..5 {
        publish_multipart(
            &client,
            &server,
            &token,
            payload(&format!("skill-{i}"), "1.0.0"),
            &[("SKILL.md", SKILL_MD)],
        )
        .await;
    }

    let resp = client
        .get(server.url("/skills?limit=2&sort=updated"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], true);
    let cursor = body["next_cursor"].as_str().unwrap().to_string();

    let resp = client
        .get(server.url(&format!("/skills?limit=2&sort=updated&cursor={}", urlenc(&cursor))))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let page2: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["slug"].as_str().unwrap())
        .collect();
    assert_eq!(page2.len(), 2);

    // Trending returns a single bounded page.
    let resp = client
        .get(server.url("/skills?limit=3&sort=trending"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["has_more"], false);
    assert!(body["data"].as_array().unwrap().len() <= 3);
}

fn urlenc(s: &str) -> String {
    s.replace('+', "%2B").replace('|', "%7C").replace(':', "%3A")
}
