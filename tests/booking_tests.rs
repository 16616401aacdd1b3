//! End-to-end booking flows over the client-plane gRPC surface.

mod test_harness;

use std::time::Duration;

use roomly::proto::admin_service_client::AdminServiceClient;
use roomly::proto::auth_service_client::AuthServiceClient;
use roomly::proto::booking_service_client::BookingServiceClient;
use roomly::proto::search_service_client::SearchServiceClient;
use roomly::proto::{
    CancelBookingRequest, CreateBookingRequest, CreateRoomRequest, JoinWaitlistRequest,
    LoginRequest, MeRequest, RegisterRequest, SearchRoomsRequest, SetRoomScheduleRequest,
};
use roomly::store::{BookingStore, WaitlistStore};
use test_harness::{TestCluster, ADMIN_EMAIL, ADMIN_PASSWORD};

const SLOT_START: &str = "2026-09-01T10:00:00Z";
const SLOT_END: &str = "2026-09-01T11:00:00Z";

async fn login(url: &str, email: &str, password: &str) -> String {
    let mut auth = AuthServiceClient::connect(url.to_string()).await.unwrap();
    let resp = auth
        .login(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(resp.success, "login failed: {}", resp.error);
    resp.session_token
}

async fn register_and_login(url: &str, email: &str) -> String {
    let mut auth = AuthServiceClient::connect(url.to_string()).await.unwrap();
    let resp = auth
        .register(RegisterRequest {
            email: email.to_string(),
            password: "longenough".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(resp.success, "register failed: {}", resp.error);
    login(url, email, "longenough").await
}

async fn user_id(url: &str, token: &str) -> String {
    let mut auth = AuthServiceClient::connect(url.to_string()).await.unwrap();
    let resp = auth
        .me(MeRequest {
            session_token: token.to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(resp.success, "me failed: {}", resp.error);
    resp.user_id
}

/// Seeds the admin, creates a room, and (optionally) declares an open
/// window around the test slot. Returns (room_id, admin_token).
async fn setup_room(
    cluster: &TestCluster,
    url: &str,
    name: &str,
    with_schedule: bool,
) -> (String, String) {
    cluster.seed_admin();
    let admin_token = login(url, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let mut admin = AdminServiceClient::connect(url.to_string()).await.unwrap();
    let created = admin
        .create_room(CreateRoomRequest {
            session_token: admin_token.clone(),
            name: name.to_string(),
            capacity: 4,
        })
        .await
        .unwrap()
        .into_inner();
    assert!(created.success, "create room failed: {}", created.error);

    if with_schedule {
        let scheduled = admin
            .set_room_schedule(SetRoomScheduleRequest {
                session_token: admin_token.clone(),
                room_id: created.room_id.clone(),
                start: "2026-09-01T08:00:00Z".to_string(),
                end: "2026-09-01T18:00:00Z".to_string(),
                is_open: true,
            })
            .await
            .unwrap()
            .into_inner();
        assert!(scheduled.success, "set schedule failed: {}", scheduled.error);
    }

    (created.room_id, admin_token)
}

fn create_req(token: &str, room_id: &str) -> CreateBookingRequest {
    CreateBookingRequest {
        session_token: token.to_string(),
        room_id: room_id.to_string(),
        start: SLOT_START.to_string(),
        end: SLOT_END.to_string(),
    }
}

#[tokio::test]
async fn test_create_booking_end_to_end() {
    let cluster = TestCluster::new(3, 50400).await;
    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("no leader elected");
    let url = cluster.get_node(&leader_id).unwrap().client_url();

    let (room_id, _) = setup_room(&cluster, &url, "alpha", true).await;
    let token = register_and_login(&url, "u1@x.com").await;

    // the room shows up in search before it is booked
    let mut search = SearchServiceClient::connect(url.clone()).await.unwrap();
    let found = search
        .search_rooms(SearchRoomsRequest {
            session_token: token.clone(),
            min_capacity: 2,
            start: SLOT_START.to_string(),
            end: SLOT_END.to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(found.success);
    assert_eq!(found.rooms.len(), 1);

    let mut booking = BookingServiceClient::connect(url.clone()).await.unwrap();
    let resp = booking
        .create_booking(create_req(&token, &room_id))
        .await
        .unwrap()
        .into_inner();
    assert!(resp.success, "booking failed: {}", resp.error);
    assert!(!resp.booking_id.is_empty());
    assert_eq!(cluster.store.confirmed_bookings(&room_id).unwrap().len(), 1);

    // overlap safety: a second user cannot double-book the slot
    let token2 = register_and_login(&url, "u2@x.com").await;
    let resp = booking
        .create_booking(create_req(&token2, &room_id))
        .await
        .unwrap()
        .into_inner();
    assert!(!resp.success);
    assert!(resp.error.contains("already booked"), "got: {}", resp.error);
    assert_eq!(cluster.store.confirmed_bookings(&room_id).unwrap().len(), 1);

    // and the slot no longer surfaces in search
    let found = search
        .search_rooms(SearchRoomsRequest {
            session_token: token,
            min_capacity: 2,
            start: SLOT_START.to_string(),
            end: SLOT_END.to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(found.success);
    assert!(found.rooms.is_empty());
}

#[tokio::test]
async fn test_booking_outside_schedule_is_rejected() {
    let cluster = TestCluster::new(3, 50430).await;
    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("no leader elected");
    let url = cluster.get_node(&leader_id).unwrap().client_url();

    // room without any open window
    let (room_id, _) = setup_room(&cluster, &url, "closed", false).await;
    let token = register_and_login(&url, "u1@x.com").await;

    let mut booking = BookingServiceClient::connect(url.clone()).await.unwrap();
    let resp = booking
        .create_booking(create_req(&token, &room_id))
        .await
        .unwrap()
        .into_inner();
    assert!(!resp.success);
    assert!(resp.error.contains("not open"), "got: {}", resp.error);
    assert!(cluster.store.confirmed_bookings(&room_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_follower_forwards_to_leader() {
    let cluster = TestCluster::new(3, 50460).await;
    cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("no leader elected");

    let follower_url = cluster.any_follower().await.expect("no follower").client_url();
    let (room_id, _) = setup_room(&cluster, &follower_url, "alpha", true).await;
    let token = register_and_login(&follower_url, "u1@x.com").await;

    // the call lands on a follower and still succeeds via forwarding,
    // creating exactly one booking cluster-wide
    let mut booking = BookingServiceClient::connect(follower_url.clone()).await.unwrap();
    let resp = booking
        .create_booking(create_req(&token, &room_id))
        .await
        .unwrap()
        .into_inner();
    assert!(resp.success, "forwarded booking failed: {}", resp.error);
    assert_eq!(cluster.store.confirmed_bookings(&room_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_promotes_waitlisted_user() {
    let cluster = TestCluster::new(3, 50490).await;
    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("no leader elected");
    let url = cluster.get_node(&leader_id).unwrap().client_url();

    let (room_id, _) = setup_room(&cluster, &url, "alpha", true).await;
    let token1 = register_and_login(&url, "u1@x.com").await;
    let token2 = register_and_login(&url, "u2@x.com").await;
    let user2 = user_id(&url, &token2).await;

    let mut booking = BookingServiceClient::connect(url.clone()).await.unwrap();
    let created = booking
        .create_booking(create_req(&token1, &room_id))
        .await
        .unwrap()
        .into_inner();
    assert!(created.success, "booking failed: {}", created.error);

    let joined = booking
        .join_waitlist(JoinWaitlistRequest {
            session_token: token2.clone(),
            room_id: room_id.clone(),
            start: SLOT_START.to_string(),
            end: SLOT_END.to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(joined.success, "join waitlist failed: {}", joined.error);

    let cancelled = booking
        .cancel_booking(CancelBookingRequest {
            session_token: token1.clone(),
            booking_id: created.booking_id.clone(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(cancelled.success, "cancel failed: {}", cancelled.error);

    // the waitlist head now holds a confirmed booking on the same slot
    let confirmed = cluster.store.confirmed_bookings(&room_id).unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].user_id, user2);
    assert_eq!(confirmed[0].start, SLOT_START);
    assert_eq!(confirmed[0].end, SLOT_END);
    assert_eq!(
        cluster
            .store
            .waitlist_len(&room_id, SLOT_START, SLOT_END)
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_auth_and_admin_guardrails() {
    let cluster = TestCluster::new(3, 50520).await;
    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("no leader elected");
    let url = cluster.get_node(&leader_id).unwrap().client_url();

    let (room_id, _) = setup_room(&cluster, &url, "alpha", true).await;

    // unauthenticated booking fails before touching the room
    let mut booking = BookingServiceClient::connect(url.clone()).await.unwrap();
    let resp = booking
        .create_booking(create_req("bogus-token", &room_id))
        .await
        .unwrap()
        .into_inner();
    assert!(!resp.success);
    assert!(resp.error.contains("invalid session"), "got: {}", resp.error);

    // one user cannot cancel another user's booking
    let token1 = register_and_login(&url, "u1@x.com").await;
    let token2 = register_and_login(&url, "u2@x.com").await;
    let created = booking
        .create_booking(create_req(&token1, &room_id))
        .await
        .unwrap()
        .into_inner();
    assert!(created.success);

    let resp = booking
        .cancel_booking(CancelBookingRequest {
            session_token: token2.clone(),
            booking_id: created.booking_id.clone(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(!resp.success);
    assert!(resp.error.contains("admin") || resp.error.contains("unauthorized"));
    assert_eq!(cluster.store.confirmed_bookings(&room_id).unwrap().len(), 1);

    // room management requires an admin session
    let mut admin = AdminServiceClient::connect(url.clone()).await.unwrap();
    let resp = admin
        .create_room(CreateRoomRequest {
            session_token: token2,
            name: "beta".to_string(),
            capacity: 2,
        })
        .await
        .unwrap()
        .into_inner();
    assert!(!resp.success);
    assert!(resp.error.contains("admin access required"));
}
