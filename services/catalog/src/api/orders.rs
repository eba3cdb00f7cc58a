use super::{json_body, AppState, ResourceId};
use crate::auth::{AdminUser, AuthUser};
use crate::dto::{OrderCreate, OrderDto, OrderStatusUpdate};
use crate::error::{ApiError, ApiResult};
use crate::models::{NewOrder, NewOrderItem};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use futures::future::try_join_all;
use tracing::{info, instrument};

fn not_found(id: i32) -> ApiError {
    ApiError::NotFound(format!("Order {id} not found"))
}

/// Admins see every order, customers their own
#[instrument(skip(state))]
pub(super) async fn list_orders(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Json<Vec<OrderDto>>> {
    let orders = if caller.is_admin() {
        state.orders.list().await?
    } else {
        state.orders.list_for_user(caller.id).await?
    };
    Ok(Json(orders.into_iter().map(OrderDto::from).collect()))
}

#[instrument(skip(state))]
pub(super) async fn get_order(
    State(state): State<AppState>,
    caller: AuthUser,
    ResourceId(id): ResourceId,
) -> ApiResult<Json<OrderDto>> {
    let order = state.orders.get(id).await?.ok_or_else(|| not_found(id))?;
    caller.ensure_owner_or_admin(order.record.user_id)?;
    Ok(Json(order.into()))
}

/// Place an order for the caller, priced from the current catalog
#[instrument(skip(state, payload))]
pub(super) async fn create_order(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<OrderCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<OrderDto>)> {
    let request = json_body(payload)?;
    request.validate()?;

    let accessories = try_join_all(
        request
            .items
            .iter()
            .map(|item| state.accessories.get(item.accessory_id)),
    )
    .await?;

    let mut total_price = 0.0;
    for (item, accessory) in request.items.iter().zip(accessories) {
        let accessory = accessory.ok_or_else(|| {
            ApiError::Validation(format!("Accessory {} does not exist", item.accessory_id))
        })?;
        total_price += accessory.price * f64::from(item.quantity);
    }

    let order = state
        .orders
        .create(NewOrder {
            user_id: caller.id,
            total_price,
            bicycle_color: request.bicycle_color.clone(),
            items: request.items.iter().map(NewOrderItem::from).collect(),
        })
        .await?;

    metrics::counter!("catalog.orders.created").increment(1);
    info!(
        id = order.record.id,
        user_id = caller.id,
        total_price,
        "Order created"
    );

    Ok((StatusCode::CREATED, Json(order.into())))
}

#[instrument(skip(state, payload))]
pub(super) async fn update_order_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    ResourceId(id): ResourceId,
    payload: Result<Json<OrderStatusUpdate>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let update = json_body(payload)?;
    state.orders.update_status(id, update.status).await?;

    info!(id, status = ?update.status, "Order status updated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub(super) async fn delete_order(
    State(state): State<AppState>,
    _admin: AdminUser,
    ResourceId(id): ResourceId,
) -> ApiResult<StatusCode> {
    state.orders.delete(id).await?;

    info!(id, "Order deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::tests::TestApp;
    use crate::models::{Accessory, NewAccessory, OrderStatus, Role};
    use crate::repository::{AccessoryRepository, OrderRepository};
    use axum::http::StatusCode;
    use serde_json::json;

    async fn accessory(app: &TestApp, description: &str, price: f64) -> Accessory {
        AccessoryRepository::create(
            &app.store,
            NewAccessory {
                name: description.to_string(),
                description: description.to_string(),
                cost: price / 2.0,
                price,
                image_path: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_order_total_is_computed_from_prices() {
        let app = TestApp::new();
        let (ana, token) = app.user_token("ana", Role::Customer).await;
        let helmet = accessory(&app, "Casco X", 20.0).await;
        let light = accessory(&app, "Luz LED", 7.5).await;

        let (status, _, order) = app
            .send(
                "POST",
                "/api/pedidos",
                Some(&token),
                Some(json!({
                    "colorBicicleta": "rojo",
                    "items": [
                        {"accesorioId": helmet.id, "cantidad": 2},
                        {"accesorioId": light.id, "cantidad": 3}
                    ]
                })),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["precioTotal"], 62.5);
        assert_eq!(order["usuarioId"], ana.id);
        assert_eq!(order["estado"], 0);
        assert_eq!(order["items"].as_array().unwrap().len(), 2);
        assert_eq!(order["items"][0]["pedidoId"], order["id"]);
    }

    #[tokio::test]
    async fn test_invalid_orders_are_rejected() {
        let app = TestApp::new();
        let (_, token) = app.user_token("ana", Role::Customer).await;
        let helmet = accessory(&app, "Casco X", 20.0).await;

        for body in [
            json!({"items": []}),
            json!({"items": [{"accesorioId": helmet.id, "cantidad": 0}]}),
            json!({"items": [{"accesorioId": 9999, "cantidad": 1}]}),
        ] {
            let (status, _, error) = app
                .send("POST", "/api/pedidos", Some(&token), Some(body))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(error["code"], "VALIDATION_ERROR");
        }

        assert!(OrderRepository::list(&app.store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_orders_are_visible_to_owner_and_admin_only() {
        let app = TestApp::new();
        let (_, ana) = app.user_token("ana", Role::Customer).await;
        let (_, luis) = app.user_token("luis", Role::Customer).await;
        let (_, admin) = app.user_token("admin", Role::Admin).await;
        let helmet = accessory(&app, "Casco X", 20.0).await;

        let (_, _, order) = app
            .send(
                "POST",
                "/api/pedidos",
                Some(&ana),
                Some(json!({"items": [{"accesorioId": helmet.id, "cantidad": 1}]})),
            )
            .await;
        let uri = format!("/api/pedidos/{}", order["id"]);

        let (status, _, _) = app.send("GET", &uri, Some(&ana), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = app.send("GET", &uri, Some(&luis), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _, _) = app.send("GET", &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, _, mine) = app.send("GET", "/api/pedidos", Some(&luis), None).await;
        assert!(mine.as_array().unwrap().is_empty());
        let (_, _, all) = app.send("GET", "/api/pedidos", Some(&admin), None).await;
        assert_eq!(all.as_array().unwrap().len(), 1);

        let (status, _, _) = app.send("GET", "/api/pedidos", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_updates_status_and_deletes() {
        let app = TestApp::new();
        let (_, ana) = app.user_token("ana", Role::Customer).await;
        let (_, admin) = app.user_token("admin", Role::Admin).await;
        let helmet = accessory(&app, "Casco X", 20.0).await;

        let (_, _, order) = app
            .send(
                "POST",
                "/api/pedidos",
                Some(&ana),
                Some(json!({"items": [{"accesorioId": helmet.id, "cantidad": 1}]})),
            )
            .await;
        let id = order["id"].as_i64().unwrap() as i32;
        let status_uri = format!("/api/pedidos/{id}/estado");

        let (status, _, _) = app
            .send("PATCH", &status_uri, Some(&ana), Some(json!({"estado": 2})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = app
            .send("PATCH", &status_uri, Some(&admin), Some(json!({"estado": 2})))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let stored = OrderRepository::get(&app.store, id).await.unwrap().unwrap();
        assert_eq!(stored.record.status, OrderStatus::Shipped);

        let (status, _, _) = app
            .send("DELETE", &format!("/api/pedidos/{id}"), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(OrderRepository::get(&app.store, id).await.unwrap().is_none());

        let (status, _, _) = app
            .send("PATCH", &status_uri, Some(&admin), Some(json!({"estado": 3})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
