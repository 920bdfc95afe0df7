mod common;

use common::*;
use reqwest::Client;
use serde_json::{Value, json};
use uuid::Uuid;

#[tokio::test]
async fn test_create_community_sets_creator_as_owner() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner = Uuid::new_v4();
    let token = user_token(owner);

    let community = create_community(&client, &server.http_url(), &token, "BRVM Traders", "PUBLIC").await;

    assert_eq!(community["name"], "BRVM Traders");
    assert_eq!(community["slug"], "brvm-traders");
    assert_eq!(community["visibility"], "PUBLIC");
    assert_eq!(community["members_count"], 1);

    let members: Value = client
        .get(format!("{}/api/communities/{}/members", server.http_url(), id_of(&community)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(members["total"], 1);
    assert_eq!(members["data"][0]["user_id"], owner.to_string());
    assert_eq!(members["data"][0]["role"], "OWNER");
}

#[tokio::test]
async fn test_duplicate_names_get_distinct_slugs() {
    let server = start_test_server().await;
    let client = Client::new();
    let token = user_token(Uuid::new_v4());

    let first = create_community(&client, &server.http_url(), &token, "Forex Club", "PUBLIC").await;
    let second = create_community(&client, &server.http_url(), &token, "Forex Club", "PUBLIC").await;

    assert_eq!(first["slug"], "forex-club");
    assert_eq!(second["slug"], "forex-club-1");
}

#[tokio::test]
async fn test_join_public_community_is_immediate() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner_token = user_token(Uuid::new_v4());
    let joiner = Uuid::new_v4();
    let joiner_token = user_token(joiner);

    let community = create_community(&client, &server.http_url(), &owner_token, "Open Market", "PUBLIC").await;
    let community_id = id_of(&community);

    let response = client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&joiner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "joined");

    let detail: Value = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&joiner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["is_member"], true);
    assert_eq!(detail["member_role"], "MEMBER");
    assert_eq!(detail["members_count"], 2);

    // Joining twice is a conflict
    let response = client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&joiner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn test_private_community_join_requires_approval() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner = Uuid::new_v4();
    let owner_token = user_token(owner);
    let requester = Uuid::new_v4();
    let requester_token = user_token(requester);

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Insider Circle", "PRIVATE").await;
    let community_id = id_of(&community);

    let response = client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&requester_token)
        .json(&json!({ "message": "Long-time lurker" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "pending");

    // Not a member yet
    let detail: Value = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&requester_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["is_member"], false);
    assert_eq!(detail["has_pending_request"], true);
    assert_eq!(detail["members_count"], 1);

    // A second join while pending is a conflict
    let response = client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&requester_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // The owner sees and approves the request
    let requests: Value = client
        .get(format!("{}/api/communities/{community_id}/requests", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(requests["total"], 1);
    assert_eq!(requests["data"][0]["user_id"], requester.to_string());
    assert_eq!(requests["data"][0]["message"], "Long-time lurker");
    let request_id = requests["data"][0]["id"].as_str().unwrap();

    let response = client
        .post(format!(
            "{}/api/communities/{community_id}/requests/{request_id}",
            server.http_url()
        ))
        .bearer_auth(&owner_token)
        .json(&json!({ "action": "approve" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "approved");

    let detail: Value = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&requester_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["is_member"], true);
    assert_eq!(detail["member_role"], "MEMBER");
    assert_eq!(detail["members_count"], 2);

    // The queue is drained
    let requests: Value = client
        .get(format!("{}/api/communities/{community_id}/requests", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(requests["total"], 0);
}

#[tokio::test]
async fn test_rejected_join_request_blocks_retry() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner_token = user_token(Uuid::new_v4());
    let requester_token = user_token(Uuid::new_v4());

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Vetted Analysts", "PRIVATE").await;
    let community_id = id_of(&community);

    client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&requester_token)
        .send()
        .await
        .unwrap();

    let requests: Value = client
        .get(format!("{}/api/communities/{community_id}/requests", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let request_id = requests["data"][0]["id"].as_str().unwrap();

    let response = client
        .post(format!(
            "{}/api/communities/{community_id}/requests/{request_id}",
            server.http_url()
        ))
        .bearer_auth(&owner_token)
        .json(&json!({ "action": "reject", "reject_reason": "Incomplete profile" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // No membership was created
    let detail: Value = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&requester_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["is_member"], false);
    assert_eq!(detail["members_count"], 1);

    // A rejected requester cannot simply re-apply
    let response = client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&requester_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_join_requests_visible_to_moderators_only() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner_token = user_token(Uuid::new_v4());
    let outsider_token = user_token(Uuid::new_v4());

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Quiet Fund", "PRIVATE").await;
    let community_id = id_of(&community);

    let response = client
        .get(format!("{}/api/communities/{community_id}/requests", server.http_url()))
        .bearer_auth(&outsider_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_secret_community_hidden_from_non_members() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner_token = user_token(Uuid::new_v4());
    let outsider_token = user_token(Uuid::new_v4());

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Dark Pool", "SECRET").await;
    let community_id = id_of(&community);

    // Indistinguishable from a missing community
    let response = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&outsider_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Unauthenticated readers get the same answer
    let response = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // No join path either
    let response = client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&outsider_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Absent from the public listing
    let listing: Value = client
        .get(format!("{}/api/communities", server.http_url()))
        .bearer_auth(&outsider_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = listing["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert!(!names.contains(&"Dark Pool"));

    // The owner still sees it directly
    let response = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_leave_community() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner_token = user_token(Uuid::new_v4());
    let member_token = user_token(Uuid::new_v4());

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Revolving Door", "PUBLIC").await;
    let community_id = id_of(&community);

    client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/communities/{community_id}/leave", server.http_url()))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Leaving twice reports there is nothing to leave
    let response = client
        .post(format!("{}/api/communities/{community_id}/leave", server.http_url()))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let detail: Value = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["members_count"], 1);
}

#[tokio::test]
async fn test_owner_cannot_leave() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner_token = user_token(Uuid::new_v4());

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Captain Stays", "PUBLIC").await;

    let response = client
        .post(format!("{}/api/communities/{}/leave", server.http_url(), id_of(&community)))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_member_role_management() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner = Uuid::new_v4();
    let owner_token = user_token(owner);
    let alice = Uuid::new_v4();
    let alice_token = user_token(alice);
    let bob = Uuid::new_v4();
    let bob_token = user_token(bob);

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Role Play", "PUBLIC").await;
    let community_id = id_of(&community);

    for token in [&alice_token, &bob_token] {
        client
            .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
    }

    // A plain member cannot change roles
    let response = client
        .patch(format!("{}/api/communities/{community_id}/members/{bob}", server.http_url()))
        .bearer_auth(&alice_token)
        .json(&json!({ "role": "MODERATOR" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // The owner promotes Alice to admin
    let response = client
        .patch(format!("{}/api/communities/{community_id}/members/{alice}", server.http_url()))
        .bearer_auth(&owner_token)
        .json(&json!({ "role": "ADMIN" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let member: Value = response.json().await.unwrap();
    assert_eq!(member["role"], "ADMIN");

    // Admins can promote others below owner
    let response = client
        .patch(format!("{}/api/communities/{community_id}/members/{bob}", server.http_url()))
        .bearer_auth(&alice_token)
        .json(&json!({ "role": "MODERATOR" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Nobody can grant OWNER through role updates
    let response = client
        .patch(format!("{}/api/communities/{community_id}/members/{bob}", server.http_url()))
        .bearer_auth(&owner_token)
        .json(&json!({ "role": "OWNER" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // The owner's own role is untouchable
    let response = client
        .patch(format!("{}/api/communities/{community_id}/members/{owner}", server.http_url()))
        .bearer_auth(&alice_token)
        .json(&json!({ "role": "MEMBER" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Self-modification is refused
    let response = client
        .patch(format!("{}/api/communities/{community_id}/members/{alice}", server.http_url()))
        .bearer_auth(&alice_token)
        .json(&json!({ "role": "MEMBER" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_remove_member_rules() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner = Uuid::new_v4();
    let owner_token = user_token(owner);
    let admin = Uuid::new_v4();
    let admin_token_ = user_token(admin);
    let member = Uuid::new_v4();
    let member_token = user_token(member);

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Bouncer Test", "PUBLIC").await;
    let community_id = id_of(&community);

    for token in [&admin_token_, &member_token] {
        client
            .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
    }
    client
        .patch(format!("{}/api/communities/{community_id}/members/{admin}", server.http_url()))
        .bearer_auth(&owner_token)
        .json(&json!({ "role": "ADMIN" }))
        .send()
        .await
        .unwrap();

    // Members cannot remove anyone
    let response = client
        .delete(format!("{}/api/communities/{community_id}/members/{admin}", server.http_url()))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // The owner cannot be removed
    let response = client
        .delete(format!("{}/api/communities/{community_id}/members/{owner}", server.http_url()))
        .bearer_auth(&admin_token_)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // An admin removes a member
    let response = client
        .delete(format!("{}/api/communities/{community_id}/members/{member}", server.http_url()))
        .bearer_auth(&admin_token_)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let detail: Value = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["members_count"], 2);
}

#[tokio::test]
async fn test_transfer_ownership() {
    let server = start_test_server().await;
    let client = Client::new();
    let founder = Uuid::new_v4();
    let founder_token = user_token(founder);
    let successor = Uuid::new_v4();
    let successor_token = user_token(successor);

    let community =
        create_community(&client, &server.http_url(), &founder_token, "Succession", "PUBLIC").await;
    let community_id = id_of(&community);

    client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&successor_token)
        .send()
        .await
        .unwrap();

    // Only the owner may transfer
    let response = client
        .post(format!("{}/api/communities/{community_id}/transfer", server.http_url()))
        .bearer_auth(&successor_token)
        .json(&json!({ "new_owner_id": successor }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = client
        .post(format!("{}/api/communities/{community_id}/transfer", server.http_url()))
        .bearer_auth(&founder_token)
        .json(&json!({ "new_owner_id": successor }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let detail: Value = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&successor_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["member_role"], "OWNER");

    let detail: Value = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&founder_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["member_role"], "ADMIN");

    // The former owner can now walk away
    let response = client
        .post(format!("{}/api/communities/{community_id}/leave", server.http_url()))
        .bearer_auth(&founder_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_concurrent_transfers_keep_a_single_owner() {
    let server = start_test_server().await;
    let client = Client::new();
    let founder_token = user_token(Uuid::new_v4());
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let community =
        create_community(&client, &server.http_url(), &founder_token, "Two Crowns", "PUBLIC").await;
    let community_id = id_of(&community);

    for target in [alice, bob] {
        client
            .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
            .bearer_auth(&user_token(target))
            .send()
            .await
            .unwrap();
    }

    let transfer_url = format!("{}/api/communities/{community_id}/transfer", server.http_url());
    let transfer = |target: Uuid| {
        let client = client.clone();
        let url = transfer_url.clone();
        let token = founder_token.clone();
        async move {
            client
                .post(&url)
                .bearer_auth(&token)
                .json(&json!({ "new_owner_id": target }))
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }
    };

    let (first, second) = tokio::join!(transfer(alice), transfer(bob));
    let successes = [first, second].iter().filter(|s| **s == 200).count();
    assert_eq!(successes, 1, "only one transfer may win");

    let members: Value = client
        .get(format!("{}/api/communities/{community_id}/members", server.http_url()))
        .bearer_auth(&founder_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let owners = members["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["role"] == "OWNER")
        .count();
    assert_eq!(owners, 1, "exactly one owner after concurrent transfers");
}

#[tokio::test]
async fn test_concurrent_removal_decrements_once() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner_token = user_token(Uuid::new_v4());
    let admin = Uuid::new_v4();
    let admin_token_ = user_token(admin);
    let member = Uuid::new_v4();
    let member_token = user_token(member);

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Double Tap", "PUBLIC").await;
    let community_id = id_of(&community);

    for token in [&admin_token_, &member_token] {
        client
            .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
    }
    client
        .patch(format!("{}/api/communities/{community_id}/members/{admin}", server.http_url()))
        .bearer_auth(&owner_token)
        .json(&json!({ "role": "ADMIN" }))
        .send()
        .await
        .unwrap();

    // The owner and the admin both try to remove the same member at once
    let remove_url = format!("{}/api/communities/{community_id}/members/{member}", server.http_url());
    let remove = |token: String| {
        let client = client.clone();
        let url = remove_url.clone();
        async move {
            client
                .delete(&url)
                .bearer_auth(&token)
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }
    };

    let (first, second) = tokio::join!(remove(owner_token.clone()), remove(admin_token_.clone()));
    let successes = [first, second].iter().filter(|s| **s == 200).count();
    assert_eq!(successes, 1, "only one removal may count");

    // The counter matches the roster: owner + admin remain
    let detail: Value = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["members_count"], 2);

    let members: Value = client
        .get(format!("{}/api/communities/{community_id}/members", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(members["total"], 2);
}

#[tokio::test]
async fn test_concurrent_joins_conflict_cleanly() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner_token = user_token(Uuid::new_v4());
    let joiner_token = user_token(Uuid::new_v4());

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Race Entry", "PUBLIC").await;
    let community_id = id_of(&community);

    let join_url = format!("{}/api/communities/{community_id}/join", server.http_url());
    let join = || {
        let client = client.clone();
        let url = join_url.clone();
        let token = joiner_token.clone();
        async move {
            client
                .post(&url)
                .bearer_auth(&token)
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }
    };

    // The loser of the race gets a clean conflict, never a server error
    let (first, second) = tokio::join!(join(), join());
    let mut statuses = [first, second];
    statuses.sort();
    assert_eq!(statuses, [200, 409]);

    let detail: Value = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["members_count"], 2);
}

#[tokio::test]
async fn test_update_community_settings() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner_token = user_token(Uuid::new_v4());
    let member_token = user_token(Uuid::new_v4());

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Tweakable", "PUBLIC").await;
    let community_id = id_of(&community);

    client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();

    // Plain members cannot touch settings
    let response = client
        .patch(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&member_token)
        .json(&json!({ "description": "hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Renaming refreshes the slug
    let response = client
        .patch(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&owner_token)
        .json(&json!({ "name": "Renamed Club", "require_post_approval": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["name"], "Renamed Club");
    assert_eq!(updated["slug"], "renamed-club");
    assert_eq!(updated["require_post_approval"], true);

    // The old slug no longer resolves, the new one does
    let response = client
        .get(format!("{}/api/communities/renamed-club", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_delete_community_requires_exact_name() {
    let server = start_test_server().await;
    let client = Client::new();
    let owner_token = user_token(Uuid::new_v4());
    let member_token = user_token(Uuid::new_v4());

    let community =
        create_community(&client, &server.http_url(), &owner_token, "Doomed Club", "PUBLIC").await;
    let community_id = id_of(&community);

    client
        .post(format!("{}/api/communities/{community_id}/join", server.http_url()))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();

    // Not even admins may delete, and the member certainly cannot
    let response = client
        .delete(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&member_token)
        .json(&json!({ "name": "Doomed Club" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // The owner must echo the exact name
    let response = client
        .delete(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&owner_token)
        .json(&json!({ "name": "doomed club" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .delete(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&owner_token)
        .json(&json!({ "name": "Doomed Club" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/api/communities/{community_id}", server.http_url()))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_my_communities_lists_memberships_with_roles() {
    let server = start_test_server().await;
    let client = Client::new();
    let user = Uuid::new_v4();
    let token = user_token(user);
    let other_token = user_token(Uuid::new_v4());

    create_community(&client, &server.http_url(), &token, "Mine Alone", "PUBLIC").await;
    let joined =
        create_community(&client, &server.http_url(), &other_token, "Joined Later", "PUBLIC").await;
    create_community(&client, &server.http_url(), &other_token, "Not Mine", "PUBLIC").await;

    client
        .post(format!("{}/api/communities/{}/join", server.http_url(), id_of(&joined)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    let mine: Value = client
        .get(format!("{}/api/me/communities", server.http_url()))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(mine["total"], 2);
    let roles: Vec<(&str, &str)> = mine["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| (c["name"].as_str().unwrap(), c["member_role"].as_str().unwrap()))
        .collect();
    assert!(roles.contains(&("Mine Alone", "OWNER")));
    assert!(roles.contains(&("Joined Later", "MEMBER")));
}

#[tokio::test]
async fn test_requests_require_authentication() {
    let server = start_test_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/communities", server.http_url()))
        .json(&json!({ "name": "No Token Club" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .post(format!("{}/api/communities", server.http_url()))
        .bearer_auth("not-a-real-token")
        .json(&json!({ "name": "Bad Token Club" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_create_community_validates_name_length() {
    let server = start_test_server().await;
    let client = Client::new();
    let token = user_token(Uuid::new_v4());

    let response = client
        .post(format!("{}/api/communities", server.http_url()))
        .bearer_auth(&token)
        .json(&json!({ "name": "ab" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}
