pub const MAP_INDEX_HTML: &str = r#"
<!doctype html>
<html lang="en" class="h-full dark">

<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Fleet Live Map</title>

  <link rel="preconnect" href="https://fonts.googleapis.com" />
  <link rel="preconnect" href="https://fonts.gstatic.com" crossorigin />
  <link href="https://fonts.googleapis.com/css2?family=Rajdhani:wght@500;600;700&display=swap" rel="stylesheet" />
  <style type="text/tailwindcss">
    @theme {
      --font-tactical: "Rajdhani", ui-sans-serif, system-ui;
      --color-fleet-bg: #050B16;
      --color-fleet-panel: #0A1628;
      --color-fleet-accent: #38bdf8;
      --color-fleet-warning: #facc15;
    }

    @layer base {
      html { @apply h-full; }
      body { @apply h-full bg-fleet-bg text-slate-100 font-[Rajdhani]; }
      #map, #preview-map { @apply h-full w-full; }
    }

    @layer components {
      .facility-marker {
        width: 16px;
        height: 16px;
        border-radius: 3px;
        background: #f97316;
        border: 2px solid rgba(15, 23, 42, 0.85);
      }

      .vehicle-marker {
        width: 18px;
        height: 18px;
        border-radius: 50%;
        background: rgba(56, 189, 248, 0.95);
        box-shadow: 0 0 0 3px rgba(14, 165, 233, 0.4), 0 0 12px rgba(56, 189, 248, 0.55);
        border: 2px solid rgba(15, 23, 42, 0.85);
        cursor: pointer;
      }

      .endpoint-marker {
        width: 14px;
        height: 14px;
        border-radius: 50%;
        border: 2px solid #0f172a;
      }
      .endpoint-origin { background: #4ade80; }
      .endpoint-destination { background: #fb7185; }
    }
  </style>
  <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>

  <!-- Leaflet 1.9.4 -->
  <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.css" crossorigin="anonymous"
    referrerpolicy="no-referrer" />
  <script src="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.js" crossorigin="anonymous"
    referrerpolicy="no-referrer"></script>
</head>

<body class="flex flex-col">
  <header class="flex items-center justify-between bg-fleet-panel px-4 py-2">
    <h1 class="text-xl font-bold tracking-wide text-fleet-accent">Fleet Live Map</h1>
    <div class="flex items-center gap-4 text-sm">
      <span id="selected" class="text-slate-300">No vehicle selected</span>
      <button id="preview-btn" class="hidden rounded bg-fleet-accent px-3 py-1 font-semibold text-slate-900">View route</button>
      <span id="updated" class="text-slate-500"></span>
    </div>
  </header>

  <main class="relative flex-1">
    <div id="map"></div>
    <div id="unavailable" class="absolute inset-0 z-[1000] hidden items-center justify-center bg-fleet-bg/90">
      <p id="unavailable-text" class="max-w-md text-center text-lg text-fleet-warning"></p>
    </div>
  </main>

  <dialog id="preview" class="m-auto w-[min(56rem,95vw)] rounded-lg bg-fleet-panel p-4 text-slate-100">
    <div class="mb-3 flex items-center justify-between">
      <h2 id="preview-title" class="text-lg font-bold"></h2>
      <button id="preview-close" class="text-slate-400 hover:text-slate-100">Close</button>
    </div>
    <div class="h-[60vh]"><div id="preview-map"></div></div>
    <dl class="mt-3 grid grid-cols-3 gap-2 text-sm">
      <div><dt class="text-slate-400">Distance</dt><dd id="preview-distance"></dd></div>
      <div><dt class="text-slate-400">Estimated time</dt><dd id="preview-eta"></dd></div>
      <div><dt class="text-slate-400">Route</dt><dd id="preview-provenance"></dd></div>
    </dl>
  </dialog>

  <script>
    const ICONS = {
      facility: L.divIcon({className: 'facility-marker', iconSize: [16, 16]}),
      vehicle: L.divIcon({className: 'vehicle-marker', iconSize: [18, 18]}),
      route_origin: L.divIcon({className: 'endpoint-marker endpoint-origin', iconSize: [14, 14]}),
      route_destination: L.divIcon({className: 'endpoint-marker endpoint-destination', iconSize: [14, 14]}),
    };

    const lineOptions = (style) => ({
      color: style.color,
      weight: style.weight,
      opacity: style.opacity,
      dashArray: style.dash || null,
    });

    const escapeHtml = (text) => String(text).replace(/[&<>"']/g, (c) => ({
      '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#39;'
    })[c]);

    const popupHtml = (content) => `
      <div class="text-sm">
        <div class="font-bold">${escapeHtml(content.plan_id)}</div>
        <div>${escapeHtml(content.origin)} &rarr; ${escapeHtml(content.destination)}</div>
        <div class="mt-1 h-2 w-40 rounded bg-slate-300">
          <div class="h-2 rounded bg-sky-500" style="width:${content.progress_percent}%"></div>
        </div>
        <div class="mt-1">${escapeHtml(content.caption)}</div>
      </div>`;

    // Mirrors the server scene by handle so unchanged layers are left alone.
    class SceneLayer {
      constructor(map) {
        this.map = map;
        this.markers = new Map();
        this.labels = new Map();
        this.lines = new Map();
        this.popup = null;
        this.popupKey = null;
      }

      // Tooltips are only touched when the marker's label text changed.
      relabel(handle, layer, label) {
        const previous = this.labels.get(handle) ?? null;
        const next = label ?? null;
        if (previous === next) return;
        if (next === null) {
          layer.unbindTooltip();
        } else {
          const html = escapeHtml(next).replace(/\n/g, '<br>');
          if (layer.getTooltip()) layer.setTooltipContent(html);
          else layer.bindTooltip(html);
        }
        this.labels.set(handle, next);
      }

      apply(scene, onMarkerClick) {
        const seenMarkers = new Set();
        for (const marker of scene.markers) {
          seenMarkers.add(marker.handle);
          let layer = this.markers.get(marker.handle);
          if (!layer) {
            layer = L.marker([marker.at.lat, marker.at.lon], {icon: ICONS[marker.icon]}).addTo(this.map);
            if (marker.click_key && onMarkerClick) {
              layer.on('click', (event) => {
                L.DomEvent.stopPropagation(event);
                onMarkerClick(marker.click_key);
              });
            }
            this.markers.set(marker.handle, layer);
          } else {
            layer.setLatLng([marker.at.lat, marker.at.lon]);
          }
          this.relabel(marker.handle, layer, marker.label);
        }
        for (const [handle, layer] of this.markers) {
          if (!seenMarkers.has(handle)) {
            layer.remove();
            this.markers.delete(handle);
            this.labels.delete(handle);
          }
        }

        const seenLines = new Set();
        for (const line of scene.polylines) {
          seenLines.add(line.handle);
          if (!this.lines.has(line.handle)) {
            const points = line.points.map((p) => [p.lat, p.lon]);
            this.lines.set(line.handle, L.polyline(points, lineOptions(line.style)).addTo(this.map));
          }
        }
        for (const [handle, layer] of this.lines) {
          if (!seenLines.has(handle)) {
            layer.remove();
            this.lines.delete(handle);
          }
        }

        const popupKey = scene.popup ? JSON.stringify(scene.popup) : null;
        if (popupKey !== this.popupKey) {
          if (this.popup) this.map.closePopup(this.popup);
          this.popup = null;
          if (scene.popup) {
            this.popup = L.popup({autoClose: false, closeOnClick: false, closeButton: false})
              .setLatLng([scene.popup.at.lat, scene.popup.at.lon])
              .setContent(popupHtml(scene.popup.content))
              .openOn(this.map);
          }
          this.popupKey = popupKey;
        }

        if (scene.viewport) {
          const {south_west: sw, north_east: ne} = scene.viewport;
          this.map.fitBounds([[sw.lat, sw.lon], [ne.lat, ne.lon]], {padding: [24, 24]});
        }
      }
    }

    const showUnavailable = (message) => {
      const overlay = document.getElementById('unavailable');
      document.getElementById('unavailable-text').textContent = message;
      overlay.classList.remove('hidden');
      overlay.classList.add('flex');
    };

    const post = (url) => fetch(url, {method: 'POST'}).catch((err) => console.warn('request failed', url, err));

    let liveMap = null;
    let liveScene = null;
    let tileUrl = null;
    let selected = null;

    const ensureMap = (payload) => {
      if (liveMap) return true;
      if (!window.L || typeof L.map !== 'function') {
        showUnavailable('Could not load map services. Please check your network connection and refresh the page.');
        return false;
      }
      tileUrl = payload.scene.tile_url;
      liveMap = L.map('map', {center: [22.8, 86.5], zoom: 6, zoomControl: false});
      L.tileLayer(tileUrl, {maxZoom: 19, attribution: '&copy; OpenStreetMap contributors'}).addTo(liveMap);
      L.control.zoom({position: 'bottomright'}).addTo(liveMap);
      liveMap.on('click', () => post('/deselect'));
      liveScene = new SceneLayer(liveMap);
      return true;
    };

    const render = (payload) => {
      document.getElementById('updated').textContent = new Date(payload.updated_at).toLocaleTimeString();
      if (!payload.available) {
        showUnavailable(payload.message);
        return;
      }
      if (!ensureMap(payload)) return;
      liveScene.apply(payload.scene, (key) => post(`/select/${encodeURIComponent(key)}`));

      selected = payload.selected;
      document.getElementById('selected').textContent = selected ? `Selected ${selected}` : 'No vehicle selected';
      document.getElementById('preview-btn').classList.toggle('hidden', !selected);
    };

    const openPreview = async () => {
      if (!selected) return;
      const response = await fetch(`/route/${encodeURIComponent(selected)}`);
      const body = await response.json();
      if (!response.ok) {
        alert(body.error);
        return;
      }
      const dialog = document.getElementById('preview');
      const summary = body.summary;
      document.getElementById('preview-title').textContent =
        `${summary.plan_id}: ${summary.origin_name} to ${summary.destination_name}`;
      document.getElementById('preview-distance').textContent = `${summary.distance_km.toFixed(1)} km`;
      document.getElementById('preview-eta').textContent = `${summary.estimated_hours} hours`;
      document.getElementById('preview-provenance').textContent =
        body.provenance === 'fallback' ? 'Direct line (routing unavailable)' : 'Road route';
      dialog.showModal();

      const old = document.getElementById('preview-map');
      const fresh = old.cloneNode(false);
      old.replaceWith(fresh);
      const map = L.map(fresh, {zoomControl: true});
      L.tileLayer(body.scene.tile_url, {maxZoom: 19}).addTo(map);
      new SceneLayer(map).apply(body.scene, null);
      setTimeout(() => map.invalidateSize(true), 80);
    };

    document.getElementById('preview-btn').addEventListener('click', openPreview);
    document.getElementById('preview-close').addEventListener('click', () => document.getElementById('preview').close());

    const source = new EventSource('/stream_scene');
    source.onmessage = (event) => render(JSON.parse(event.data));
    source.addEventListener('error', () => console.warn('scene stream interrupted; retrying'));
  </script>
</body>

</html>
"#;
