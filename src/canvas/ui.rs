use axum::{
    extract::{Path, State},
    response::Html,
    routing::get,
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::state::AppState;

const CANVAS_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Team Canvas</title>
    <style>
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f5f5f5; }
        .layout { display: grid; grid-template-columns: 1fr 320px; gap: 24px; max-width: 1400px; margin: 0 auto; padding: 24px; }
        .header { grid-column: 1 / -1; display: flex; justify-content: space-between; align-items: center; }
        .header input { font-size: 22px; font-weight: 600; border: none; background: transparent; color: #1a1a1a; }
        .header input:focus { outline: 2px solid #0066cc; border-radius: 6px; }
        .btn { padding: 10px 20px; border: none; border-radius: 8px; cursor: pointer; font-size: 14px; font-weight: 500; }
        .btn-primary { background: #0066cc; color: white; }
        .btn-primary:disabled { background: #b0c4d8; cursor: not-allowed; }
        .btn-danger { background: #cc3333; color: white; }
        .canvas { background: white; border-radius: 12px; padding: 24px; box-shadow: 0 2px 8px rgba(0,0,0,0.08); min-height: 480px; }
        .career-node { border: 2px solid #0066cc; border-radius: 12px; padding: 16px; margin-bottom: 20px; cursor: pointer; }
        .career-node.empty { border-style: dashed; color: #888; text-align: center; padding: 48px; }
        .slot { border: 1px dashed #c0c0c0; border-radius: 10px; padding: 12px; margin: 12px 0; min-height: 56px; }
        .slot.drag-over { border-color: #0066cc; background: #eef5ff; }
        .slot.drag-reject { border-color: #cc3333; background: #fff0f0; }
        .slot-title { font-size: 12px; text-transform: uppercase; color: #666; margin-bottom: 8px; display: flex; justify-content: space-between; }
        .chip { display: inline-flex; align-items: center; gap: 6px; background: #f0f4f8; border-radius: 16px; padding: 4px 12px; margin: 3px; font-size: 13px; }
        .chip .star { cursor: pointer; color: #c0c0c0; }
        .chip .star.on { color: #e8a500; }
        .chip .remove { cursor: pointer; color: #999; visibility: hidden; }
        .chip:hover .remove { visibility: visible; }
        .course-node { border: 1px solid #e0e0e0; border-radius: 10px; padding: 14px; margin: 12px 0; }
        .course-head { display: flex; justify-content: space-between; font-weight: 600; }
        .pool { background: white; border-radius: 12px; padding: 16px; box-shadow: 0 2px 8px rgba(0,0,0,0.08); align-self: start; }
        .pool input, .pool select { width: 100%; padding: 8px; margin-bottom: 8px; border: 1px solid #ddd; border-radius: 8px; font-size: 13px; }
        .pool-group h4 { font-size: 12px; text-transform: uppercase; color: #666; margin: 10px 0 6px; }
        .pool-user { padding: 6px 10px; border-radius: 8px; cursor: grab; font-size: 13px; }
        .pool-user:hover { background: #f0f4f8; }
        .modal-backdrop { position: fixed; inset: 0; background: rgba(0,0,0,0.4); display: none; align-items: center; justify-content: center; }
        .modal-backdrop.open { display: flex; }
        .modal { background: white; border-radius: 12px; padding: 20px; width: 420px; max-height: 70vh; overflow-y: auto; }
        .modal-item { padding: 10px 12px; border-radius: 8px; cursor: pointer; }
        .modal-item:hover { background: #eef5ff; }
        .toast-region { position: fixed; bottom: 24px; right: 24px; display: flex; flex-direction: column; gap: 8px; }
        .toast { background: #1a1a1a; color: white; border-radius: 8px; padding: 12px 16px; font-size: 13px; max-width: 360px; }
        .toast.destructive { background: #cc3333; }
        .add-btn { border: none; background: none; color: #0066cc; cursor: pointer; font-size: 13px; }
    </style>
</head>
<body>
    <div class="layout">
        <div class="header">
            <input id="team-name" placeholder="New Team" onchange="renameTeam(this.value)">
            <div>
                <button class="btn btn-danger" id="archive-btn" style="display:none" onclick="archiveTeam()">Archive</button>
                <button class="btn btn-primary" id="save-btn" disabled onclick="saveTeam()">Save</button>
            </div>
        </div>
        <div class="canvas" id="canvas-root"></div>
        <div class="pool">
            <input id="pool-search" placeholder="Search staff..." oninput="refreshPool()">
            <select id="pool-role" onchange="refreshPool()">
                <option value="all">All roles</option>
                <option value="super_moderator">Super-moderators</option>
                <option value="senior_moderator">Senior moderators</option>
                <option value="moderator">Moderators</option>
            </select>
            <div id="pool-root"></div>
        </div>
    </div>
    <div class="modal-backdrop" id="modal"><div class="modal" id="modal-body"></div></div>
    <div class="toast-region" id="toasts"></div>

    <script>
        const BOOT = { teamId: __TEAM_ID__ };
        let view = null;

        function toast(notice) {
            if (!notice) return;
            const el = document.createElement('div');
            el.className = 'toast' + (notice.variant === 'destructive' ? ' destructive' : '');
            el.textContent = notice.description ? (notice.title + ' — ' + notice.description) : notice.title;
            document.getElementById('toasts').appendChild(el);
            setTimeout(() => el.remove(), 5000);
        }

        async function api(method, path, body) {
            const res = await fetch(path, {
                method,
                headers: { 'Content-Type': 'application/json' },
                body: body === undefined ? undefined : JSON.stringify(body),
            });
            const payload = await res.json();
            if (!res.ok) { toast(payload.notice); throw new Error(payload.error || res.status); }
            return payload;
        }

        const base = () => '/api/teams/canvas/' + view.session_id;

        async function boot() {
            const payload = BOOT.teamId
                ? await api('POST', '/api/teams/' + BOOT.teamId + '/canvas')
                : await api('POST', '/api/teams/canvas');
            view = payload.data;
            render();
            refreshPool();
        }

        function apply(payload) { view = payload.data; render(); }

        async function renameTeam(name) { apply(await api('POST', base() + '/name', { name })); }

        async function saveTeam() {
            try {
                const payload = await api('POST', base() + '/save');
                toast(payload.notice);
                setTimeout(() => { window.location.href = '/teams'; }, 800);
            } catch (_) { /* session stays open for retry */ }
        }

        async function archiveTeam() {
            try {
                const payload = await api('POST', base() + '/archive');
                toast(payload.notice);
                setTimeout(() => { window.location.href = '/teams'; }, 800);
            } catch (_) {}
        }

        async function openCareerSelector() {
            const payload = await api('GET', base() + '/selectors/careers');
            openModal(payload.data.map(c => ({
                label: c.name,
                pick: async () => apply(await api('POST', base() + '/career', { career_id: c.id })),
            })));
        }

        async function openCourseSelector() {
            const payload = await api('GET', base() + '/selectors/courses');
            openModal(payload.data.map(c => ({
                label: c.name + (c.status !== 'published' ? ' (' + c.status + ')' : ''),
                pick: async () => apply(await api('POST', base() + '/courses', { course_id: c.id })),
            })));
        }

        async function openUserSelector(role, exclude, post) {
            const query = '?role=' + role + '&exclude=' + exclude.join(',');
            const payload = await api('GET', base() + '/selectors/users' + query);
            openModal(payload.data.map(u => ({
                label: (u.full_name || u.email),
                pick: async () => apply(await api('POST', post, { user_id: u.id })),
            })));
        }

        function openModal(items) {
            const body = document.getElementById('modal-body');
            body.innerHTML = '';
            if (!items.length) {
                const empty = document.createElement('div');
                empty.textContent = 'Nothing to add';
                body.appendChild(empty);
            }
            for (const item of items) {
                const el = document.createElement('div');
                el.className = 'modal-item';
                el.textContent = item.label;
                el.onclick = async () => { closeModal(); await item.pick(); };
                body.appendChild(el);
            }
            document.getElementById('modal').classList.add('open');
        }
        function closeModal() { document.getElementById('modal').classList.remove('open'); }
        document.getElementById('modal').addEventListener('click', e => {
            if (e.target.id === 'modal') closeModal();
        });

        // ----- Drag and drop -----

        let dragRole = null;

        async function onDragStart(e, userId, role) {
            dragRole = role;
            e.dataTransfer.effectAllowed = 'copy';
            await api('POST', base() + '/drag', { user_id: userId });
        }

        function onDragOver(e, zoneRole) {
            e.preventDefault();
            const el = e.currentTarget;
            el.classList.toggle('drag-over', dragRole === zoneRole);
            el.classList.toggle('drag-reject', dragRole !== null && dragRole !== zoneRole);
        }

        function onDragLeave(e) {
            e.currentTarget.classList.remove('drag-over', 'drag-reject');
        }

        async function onDrop(e, zone) {
            e.preventDefault();
            onDragLeave(e);
            dragRole = null;
            apply(await api('POST', base() + '/drop', { zone }));
        }

        // ----- Rendering -----

        function chip(slot, { starred, onStar, onRemove }) {
            const el = document.createElement('span');
            el.className = 'chip';
            const name = document.createElement('span');
            name.textContent = slot.user.full_name || slot.user.email;
            el.appendChild(name);
            if (onStar) {
                const star = document.createElement('span');
                star.className = 'star' + (starred ? ' on' : '');
                star.textContent = '★';
                star.title = 'Make default manager';
                star.onclick = onStar;
                el.appendChild(star);
            }
            const remove = document.createElement('span');
            remove.className = 'remove';
            remove.textContent = '✕';
            remove.onclick = onRemove;
            el.appendChild(remove);
            return el;
        }

        function slotBox(title, zone, zoneRole, entries, addAction) {
            const box = document.createElement('div');
            box.className = 'slot';
            box.ondragover = e => onDragOver(e, zoneRole);
            box.ondragleave = onDragLeave;
            box.ondrop = e => onDrop(e, zone);
            box.ondblclick = addAction;
            const head = document.createElement('div');
            head.className = 'slot-title';
            head.textContent = title;
            const add = document.createElement('button');
            add.className = 'add-btn';
            add.textContent = '+';
            add.onclick = e => { e.stopPropagation(); addAction(); };
            head.appendChild(add);
            box.appendChild(head);
            for (const entry of entries) box.appendChild(entry);
            return box;
        }

        function render() {
            document.getElementById('team-name').value = view.model.name;
            document.getElementById('save-btn').disabled = !view.can_save || view.phase === 'saving';
            document.getElementById('archive-btn').style.display = view.mode === 'edit' ? '' : 'none';

            const root = document.getElementById('canvas-root');
            root.innerHTML = '';

            if (!view.model.career) {
                const empty = document.createElement('div');
                empty.className = 'career-node empty';
                empty.textContent = 'Double-click to choose a career';
                empty.ondblclick = openCareerSelector;
                root.appendChild(empty);
                return;
            }

            const careerNode = document.createElement('div');
            careerNode.className = 'career-node';
            careerNode.textContent = view.model.career.name;
            careerNode.style.borderColor = view.model.career.color;
            careerNode.ondblclick = openCareerSelector;
            root.appendChild(careerNode);

            const superIds = view.model.super_moderators.map(s => s.user.id);
            root.appendChild(slotBox(
                'Super-moderators', 'super_moderator', 'super_moderator',
                view.model.super_moderators.map(s => chip(s, {
                    onRemove: async () => apply(await api('DELETE', base() + '/super-moderators/' + s.id)),
                })),
                () => openUserSelector('super_moderator', superIds, base() + '/super-moderators'),
            ));

            for (const node of view.model.courses) {
                const courseEl = document.createElement('div');
                courseEl.className = 'course-node';
                const head = document.createElement('div');
                head.className = 'course-head';
                head.textContent = node.course.name;
                const removeCourse = document.createElement('span');
                removeCourse.className = 'remove';
                removeCourse.style.cursor = 'pointer';
                removeCourse.textContent = '✕';
                removeCourse.onclick = async () =>
                    apply(await api('DELETE', base() + '/courses/' + node.course.id));
                head.appendChild(removeCourse);
                courseEl.appendChild(head);

                const courseBase = base() + '/courses/' + node.course.id;
                const seniorIds = node.senior_moderators.map(s => s.user.id);
                courseEl.appendChild(slotBox(
                    'Senior moderators', 'senior_moderator:' + node.course.id, 'senior_moderator',
                    node.senior_moderators.map(s => chip(s, {
                        starred: s.is_default_manager,
                        onStar: async () => apply(await api('POST', courseBase + '/default-manager', { assignment_id: s.id })),
                        onRemove: async () => apply(await api('DELETE', courseBase + '/senior-moderators/' + s.id)),
                    })),
                    () => openUserSelector('senior_moderator', seniorIds, courseBase + '/senior-moderators'),
                ));

                const modIds = node.moderators.map(s => s.user.id);
                courseEl.appendChild(slotBox(
                    'Moderators', 'moderator:' + node.course.id, 'moderator',
                    node.moderators.map(s => chip(s, {
                        onRemove: async () => apply(await api('DELETE', courseBase + '/moderators/' + s.id)),
                    })),
                    () => openUserSelector('moderator', modIds, courseBase + '/moderators'),
                ));
                root.appendChild(courseEl);
            }

            const addCourse = document.createElement('button');
            addCourse.className = 'add-btn';
            addCourse.textContent = '+ Add course';
            addCourse.onclick = openCourseSelector;
            root.appendChild(addCourse);
        }

        async function refreshPool() {
            const search = encodeURIComponent(document.getElementById('pool-search').value);
            const role = document.getElementById('pool-role').value;
            const payload = await api('GET', '/api/directory/pool?search=' + search + '&role=' + role);
            const groups = payload.data;
            const root = document.getElementById('pool-root');
            root.innerHTML = '';
            const sections = [
                ['Super-moderators', 'super_moderator', groups.super_moderators],
                ['Senior moderators', 'senior_moderator', groups.senior_moderators],
                ['Moderators', 'moderator', groups.moderators],
            ];
            for (const [title, role, users] of sections) {
                if (!users.length) continue;
                const group = document.createElement('div');
                group.className = 'pool-group';
                const h = document.createElement('h4');
                h.textContent = title;
                group.appendChild(h);
                for (const u of users) {
                    const el = document.createElement('div');
                    el.className = 'pool-user';
                    el.draggable = true;
                    el.textContent = u.full_name || u.email;
                    el.ondragstart = e => onDragStart(e, u.id, role);
                    el.ondragend = () => { dragRole = null; api('DELETE', base() + '/drag').catch(() => {}); };
                    group.appendChild(el);
                }
                root.appendChild(group);
            }
        }

        boot();
    </script>
</body>
</html>"#;

fn page_with_boot(team_id: Option<Uuid>) -> Html<String> {
    let marker = match team_id {
        Some(id) => format!("\"{}\"", id),
        None => "null".to_string(),
    };
    Html(CANVAS_PAGE.replace("__TEAM_ID__", &marker))
}

pub async fn handle_new_canvas_page(State(_state): State<Arc<AppState>>) -> Html<String> {
    page_with_boot(None)
}

pub async fn handle_edit_canvas_page(
    State(_state): State<Arc<AppState>>,
    Path(team_id): Path<Uuid>,
) -> Html<String> {
    page_with_boot(Some(team_id))
}

pub fn configure_ui() -> Router<Arc<AppState>> {
    Router::new()
        .route("/teams/canvas/new", get(handle_new_canvas_page))
        .route("/teams/canvas/{team_id}", get(handle_edit_canvas_page))
}
